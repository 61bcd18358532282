//! Topology indexes derived from a manifest.

use std::collections::{BTreeMap, BTreeSet};

use crate::manifest::Manifest;
use crate::tag::{Tag, TagLabel};

/// Unique tags per dimension plus the cluster, account and stream hierarchies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyIndex {
    servers: BTreeSet<Tag>,
    clusters: BTreeSet<Tag>,
    accounts: BTreeSet<Tag>,
    streams: BTreeSet<Tag>,
    cluster_servers: BTreeMap<String, BTreeSet<String>>,
    account_streams: BTreeMap<String, BTreeSet<String>>,
    stream_servers: BTreeMap<(String, String), BTreeSet<String>>,
}

impl TopologyIndex {
    /// Builds every index in a single pass over the manifest.
    pub fn build(manifest: &Manifest) -> Self {
        let mut index = Self::default();
        for (_, tags) in manifest {
            index.record(tags);
        }
        tracing::debug!(
            servers = index.servers.len(),
            clusters = index.clusters.len(),
            accounts = index.accounts.len(),
            streams = index.streams.len(),
            "built archive indexes"
        );
        index
    }

    fn record(&mut self, tags: &[Tag]) {
        let mut server = None;
        let mut cluster = None;
        let mut account = None;
        let mut stream = None;

        for tag in tags {
            match tag.name() {
                TagLabel::Server => {
                    self.servers.insert(tag.clone());
                    server = Some(tag.value());
                }
                TagLabel::Cluster => {
                    self.clusters.insert(tag.clone());
                    cluster = Some(tag.value());
                }
                TagLabel::Account => {
                    self.accounts.insert(tag.clone());
                    account = Some(tag.value());
                }
                TagLabel::Stream => {
                    self.streams.insert(tag.clone());
                    stream = Some(tag.value());
                }
                TagLabel::ArtifactType | TagLabel::ProfileName => {}
            }
        }

        if let Some(cluster) = cluster {
            let servers = self.cluster_servers.entry(cluster.to_string()).or_default();
            if let Some(server) = server {
                servers.insert(server.to_string());
            }
        }
        if let Some(account) = account {
            let streams = self.account_streams.entry(account.to_string()).or_default();
            if let Some(stream) = stream {
                streams.insert(stream.to_string());
                let servers = self
                    .stream_servers
                    .entry((account.to_string(), stream.to_string()))
                    .or_default();
                if let Some(server) = server {
                    servers.insert(server.to_string());
                }
            }
        }
    }

    pub fn server_tags(&self) -> Vec<Tag> {
        self.servers.iter().cloned().collect()
    }

    pub fn cluster_tags(&self) -> Vec<Tag> {
        self.clusters.iter().cloned().collect()
    }

    pub fn account_tags(&self) -> Vec<Tag> {
        self.accounts.iter().cloned().collect()
    }

    pub fn stream_tags(&self) -> Vec<Tag> {
        self.streams.iter().cloned().collect()
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.cluster_servers.keys().cloned().collect()
    }

    pub fn cluster_server_names(&self, cluster: &str) -> Vec<String> {
        owned(self.cluster_servers.get(cluster))
    }

    pub fn account_names(&self) -> Vec<String> {
        self.account_streams.keys().cloned().collect()
    }

    pub fn account_stream_names(&self, account: &str) -> Vec<String> {
        owned(self.account_streams.get(account))
    }

    pub fn stream_server_names(&self, account: &str, stream: &str) -> Vec<String> {
        owned(
            self.stream_servers
                .get(&(account.to_string(), stream.to_string())),
        )
    }
}

fn owned(set: Option<&BTreeSet<String>>) -> Vec<String> {
    set.map(|names| names.iter().cloned().collect())
        .unwrap_or_default()
}
