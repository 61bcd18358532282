use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clustercap_core::{Reader, Tag};
use serde::Serialize;

use crate::QueryFilter;

#[derive(Debug, Serialize)]
pub(crate) struct InspectReport {
    pub(crate) path: PathBuf,
    pub(crate) size: u64,
    pub(crate) blake3: String,
    pub(crate) entries: usize,
    pub(crate) artifacts: usize,
    /// cluster -> servers
    pub(crate) clusters: BTreeMap<String, Vec<String>>,
    /// account -> stream -> replica servers
    pub(crate) accounts: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub(crate) warnings: Vec<String>,
}

pub(crate) fn archive_digest(path: &Path) -> io::Result<(u64, blake3::Hash)> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(file)?;
    Ok((size, hasher.finalize()))
}

pub(crate) fn build_report(
    path: &Path,
    reader: &Reader,
) -> Result<InspectReport, Box<dyn std::error::Error>> {
    let (size, digest) = archive_digest(path)?;

    let clusters = reader
        .cluster_names()
        .into_iter()
        .map(|cluster| {
            let servers = reader.cluster_server_names(&cluster);
            (cluster, servers)
        })
        .collect();
    let accounts = reader
        .account_names()
        .into_iter()
        .map(|account| {
            let streams = reader
                .account_stream_names(&account)
                .into_iter()
                .map(|stream| {
                    let replicas = reader.stream_server_names(&account, &stream);
                    (stream, replicas)
                })
                .collect();
            (account, streams)
        })
        .collect();

    Ok(InspectReport {
        path: path.to_path_buf(),
        size,
        blake3: digest.to_hex().to_string(),
        entries: reader.entries().len(),
        artifacts: reader.manifest().len(),
        clusters,
        accounts,
        warnings: reader
            .integrity_warnings()
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}

pub(crate) fn write_report(out: &mut impl Write, report: &InspectReport) -> io::Result<()> {
    writeln!(out, "Archive: {}", report.path.display())?;
    writeln!(out, "Size: {} bytes", report.size)?;
    writeln!(out, "blake3: {}", report.blake3)?;
    writeln!(
        out,
        "Entries: {} ({} tagged artifacts)",
        report.entries, report.artifacts
    )?;

    writeln!(out, "\nClusters:")?;
    if report.clusters.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for (cluster, servers) in &report.clusters {
        writeln!(out, "  {cluster} ({} servers): {}", servers.len(), servers.join(", "))?;
    }

    writeln!(out, "\nAccounts:")?;
    if report.accounts.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for (account, streams) in &report.accounts {
        writeln!(out, "  {account} ({} streams)", streams.len())?;
        for (stream, replicas) in streams {
            writeln!(out, "    {stream}: {}", replicas.join(", "))?;
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out, "\nWarnings:")?;
        for warning in &report.warnings {
            writeln!(out, "  {warning}")?;
        }
    }
    Ok(())
}

impl QueryFilter {
    pub(crate) fn tags(&self) -> Vec<Tag> {
        let dimensions: [(Option<&String>, fn(String) -> Tag); 6] = [
            (self.cluster.as_ref(), Tag::cluster),
            (self.server.as_ref(), Tag::server),
            (self.account.as_ref(), Tag::account),
            (self.stream.as_ref(), Tag::stream),
            (self.artifact_type.as_ref(), Tag::artifact_type),
            (self.profile_name.as_ref(), Tag::profile_name),
        ];
        dimensions
            .into_iter()
            .filter_map(|(value, tag)| value.map(|value| tag(value.clone())))
            .collect()
    }
}

/// Prints matching paths with `list`, otherwise the single matching artifact
/// as pretty JSON.
pub(crate) fn run_query(
    out: &mut impl Write,
    reader: &Reader,
    filter: &QueryFilter,
    list: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let tags = filter.tags();
    if list {
        for path in reader.find(&tags) {
            writeln!(out, "{path}")?;
        }
        return Ok(());
    }
    let value: serde_json::Value = reader.load(&tags)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

pub(crate) fn cat_entry(
    out: &mut impl Write,
    reader: &Reader,
    path: &str,
) -> Result<u64, Box<dyn std::error::Error>> {
    let (mut entry, _) = reader.get_raw(path)?;
    let copied = io::copy(&mut entry, out)?;
    out.flush()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustercap_core::{ArchiveError, Sideband, Writer};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("capture.zip");
        let mut writer = Writer::create(&path).unwrap();
        for server in ["s1", "s2"] {
            writer
                .add(
                    &json!({"status": "ok"}),
                    &[Tag::cluster("east"), Tag::server(server), Tag::health()],
                )
                .unwrap();
            writer
                .add(
                    &json!({"name": "ORDERS"}),
                    &[
                        Tag::account("APP"),
                        Tag::stream("ORDERS"),
                        Tag::server(server),
                        Tag::stream_details(),
                        Tag::cluster("east"),
                    ],
                )
                .unwrap();
        }
        writer
            .add_sideband(Sideband::CaptureLog, &b"done\n"[..])
            .unwrap();
        writer.close().unwrap();
        path
    }

    #[test]
    fn report_describes_topology() {
        let dir = TempDir::new().unwrap();
        let path = sample(&dir);
        let reader = Reader::open(&path).unwrap();

        let report = build_report(&path, &reader).unwrap();
        assert_eq!(report.artifacts, 4);
        assert_eq!(report.entries, 6);
        assert_eq!(report.size, std::fs::metadata(&path).unwrap().len());
        assert_eq!(report.blake3.len(), 64);
        assert_eq!(report.clusters["east"], ["s1", "s2"]);
        assert_eq!(report.accounts["APP"]["ORDERS"], ["s1", "s2"]);
        assert!(report.warnings.is_empty());

        let mut out = Vec::new();
        write_report(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("east (2 servers): s1, s2"));
        assert!(text.contains("ORDERS: s1, s2"));
    }

    #[test]
    fn filter_builds_tags_in_dimension_order() {
        let filter = QueryFilter {
            server: Some("s1".to_string()),
            artifact_type: Some("health".to_string()),
            ..QueryFilter::default()
        };
        assert_eq!(filter.tags(), [Tag::server("s1"), Tag::health()]);
        assert!(QueryFilter::default().tags().is_empty());
    }

    #[test]
    fn query_lists_or_loads() {
        let dir = TempDir::new().unwrap();
        let reader = Reader::open(sample(&dir)).unwrap();

        let filter = QueryFilter {
            stream: Some("ORDERS".to_string()),
            ..QueryFilter::default()
        };
        let mut out = Vec::new();
        run_query(&mut out, &reader, &filter, true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);

        let err = run_query(&mut Vec::new(), &reader, &filter, false).unwrap_err();
        let err = err.downcast_ref::<ArchiveError>().unwrap();
        assert!(err.is_multiple_matches());

        let filter = QueryFilter {
            server: Some("s2".to_string()),
            artifact_type: Some("health".to_string()),
            ..QueryFilter::default()
        };
        let mut out = Vec::new();
        run_query(&mut out, &reader, &filter, false).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn cat_copies_sideband_bytes() {
        let dir = TempDir::new().unwrap();
        let reader = Reader::open(sample(&dir)).unwrap();
        let mut out = Vec::new();
        let copied = cat_entry(&mut out, &reader, Sideband::CaptureLog.path()).unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"done\n");
        assert!(cat_entry(&mut Vec::new(), &reader, "capture/nope.json").is_err());
    }
}
