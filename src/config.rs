use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Thresholds used by the analyzer checks. Any field left out of the config
/// file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AnalyzeConfig {
    /// Fraction above the cluster mean at which a server's memory is flagged.
    pub(crate) memory_outlier_threshold: f64,
    /// Fraction behind the most advanced replica at which a replica lags.
    pub(crate) lagging_replica_threshold: f64,
    /// Per-core CPU usage above which a server is flagged.
    pub(crate) cpu_usage_threshold: f64,
    pub(crate) high_cardinality_subjects: u64,
    pub(crate) ha_assets_threshold: u64,
    /// Usage of reserved JetStream memory/storage above which a server is flagged.
    pub(crate) reserved_usage_threshold: f64,
    pub(crate) account_limits: AccountLimitThresholds,
    pub(crate) stream_limits: StreamLimitThresholds,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            memory_outlier_threshold: 0.5,
            lagging_replica_threshold: 0.1,
            cpu_usage_threshold: 0.9,
            high_cardinality_subjects: 1_000_000,
            ha_assets_threshold: 1000,
            reserved_usage_threshold: 0.9,
            account_limits: AccountLimitThresholds::default(),
            stream_limits: StreamLimitThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AccountLimitThresholds {
    pub(crate) connections: f64,
    pub(crate) leafnodes: f64,
    pub(crate) subscriptions: f64,
    pub(crate) streams: f64,
}

impl Default for AccountLimitThresholds {
    fn default() -> Self {
        Self {
            connections: 0.95,
            leafnodes: 0.9,
            subscriptions: 1.0,
            streams: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct StreamLimitThresholds {
    pub(crate) messages: f64,
    pub(crate) bytes: f64,
    pub(crate) consumers: f64,
}

impl Default for StreamLimitThresholds {
    fn default() -> Self {
        Self {
            messages: 0.95,
            bytes: 0.95,
            consumers: 0.9,
        }
    }
}

pub(crate) fn load_analyze_config(path: Option<&Path>) -> Result<AnalyzeConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(AnalyzeConfig::default());
    };
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
