use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Extra;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiStats {
    pub total: u64,
    pub errors: u64,
}

/// Usage counters shared by the server-wide and per-account JetStream reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetStreamStats {
    pub memory: u64,
    pub storage: u64,
    pub reserved_memory: u64,
    pub reserved_storage: u64,
    pub accounts: u64,
    pub ha_assets: u64,
    pub api: ApiStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerInfo {
    pub name: String,
    pub current: bool,
    pub offline: bool,
    /// Nanoseconds since the peer was last heard from.
    pub active: i64,
    pub lag: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaClusterInfo {
    pub name: String,
    pub leader: String,
    pub peer: String,
    pub replicas: Vec<PeerInfo>,
    pub cluster_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader: Option<String>,
    pub replicas: Vec<PeerInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: String,
    pub max_consumers: i64,
    pub max_msgs: i64,
    pub max_bytes: i64,
    pub num_replicas: u32,
    pub storage: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamState {
    pub messages: u64,
    pub bytes: u64,
    pub first_seq: u64,
    pub last_seq: u64,
    pub num_subjects: u64,
    pub consumer_count: u64,
}

/// One replica's view of a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDetail {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<StreamConfig>,
    pub state: StreamState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumer_detail: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl StreamDetail {
    /// Cluster the stream is placed in, if it reported one.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster
            .as_ref()
            .and_then(|cluster| cluster.name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountDetail {
    pub name: String,
    pub id: String,
    #[serde(flatten)]
    pub stats: JetStreamStats,
    pub stream_detail: Vec<StreamDetail>,
}

/// Server-wide JetStream report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsInfo {
    pub server_id: String,
    pub disabled: bool,
    pub streams: u64,
    pub consumers: u64,
    pub messages: u64,
    pub bytes: u64,
    #[serde(flatten)]
    pub stats: JetStreamStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_cluster: Option<MetaClusterInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub account_details: Vec<AccountDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsz_with_account_details() {
        let doc = r#"{
            "server_id": "N1",
            "memory": 10, "storage": 20, "reserved_memory": 100, "reserved_storage": 200,
            "ha_assets": 3,
            "meta_cluster": {"name": "C1", "leader": "S1", "replicas": [{"name": "S2", "current": true}]},
            "account_details": [{
                "name": "A", "id": "A",
                "stream_detail": [{
                    "name": "ORDERS",
                    "cluster": {"name": "C1", "leader": "S1"},
                    "config": {"name": "ORDERS", "max_msgs": -1, "max_bytes": 1024, "max_consumers": 10, "discard": "old"},
                    "state": {"messages": 5, "bytes": 512, "first_seq": 1, "last_seq": 5, "consumer_count": 2}
                }]
            }]
        }"#;
        let info: JsInfo = serde_json::from_str(doc).unwrap();
        assert_eq!(info.stats.reserved_storage, 200);
        assert_eq!(info.stats.ha_assets, 3);
        let meta = info.meta_cluster.as_ref().unwrap();
        assert!(meta.replicas[0].current);
        assert!(!meta.replicas[0].offline);

        let stream = &info.account_details[0].stream_detail[0];
        assert_eq!(stream.cluster_name(), Some("C1"));
        assert_eq!(stream.state.last_seq, 5);
        let config = stream.config.as_ref().unwrap();
        assert_eq!(config.max_msgs, -1);
        assert_eq!(config.extra["discard"], "old");
    }
}
