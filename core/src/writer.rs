//! Archive writer: tag-named artifacts, sideband entries and the manifest.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::container::{ContainerWriter, ZipContainerWriter};
use crate::error::{ArchiveError, Result};
use crate::manifest::Manifest;
use crate::tag::{Tag, describe, name_for};

/// Well-known archive entries that live outside the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sideband {
    /// Free-form text log of the capture session.
    CaptureLog,
    /// JSON description of who captured the archive, and when.
    CaptureMetadata,
}

impl Sideband {
    pub const ALL: [Sideband; 2] = [Sideband::CaptureLog, Sideband::CaptureMetadata];

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Sideband::CaptureLog => "capture/capture.log",
            Sideband::CaptureMetadata => "capture/capture_info.json",
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sideband| sideband.path() == path)
    }
}

/// Runtime details recorded alongside a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    #[serde(rename = "capture_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub connected_server_name: String,
    pub connected_server_version: String,
    pub connect_url: String,
    pub user_name: String,
    #[serde(rename = "cli_version")]
    pub tool_version: String,
}

/// Writes one capture session into a container.
///
/// Artifacts are named from their tags with [`name_for`] and recorded in an
/// in-memory [`Manifest`], which is persisted by [`Writer::close`]. An archive
/// whose writer was never closed has no manifest and cannot be opened.
pub struct Writer<C: ContainerWriter = ZipContainerWriter> {
    container: C,
    manifest: Manifest,
    sidebands: Vec<Sideband>,
    closed: bool,
}

impl Writer<ZipContainerWriter> {
    /// Creates (or truncates) a zip archive at `path`. The parent directory must exist.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::with_container(ZipContainerWriter::create(path)?))
    }

    pub fn path(&self) -> &Path {
        self.container.path()
    }
}

impl<C: ContainerWriter> Writer<C> {
    pub fn with_container(container: C) -> Self {
        Self {
            container,
            manifest: Manifest::new(),
            sidebands: Vec::new(),
            closed: false,
        }
    }

    /// Serializes `value` as indented JSON and stores it under the path its tags name.
    pub fn add<T: Serialize + ?Sized>(&mut self, value: &T, tags: &[Tag]) -> Result<String> {
        self.ensure_open()?;
        let encoded = encode_pretty(value, || describe(tags))?;
        self.add_raw(encoded.as_slice(), tags)
    }

    /// Stores caller-supplied bytes as-is under the path its tags name.
    pub fn add_raw(&mut self, mut content: impl Read, tags: &[Tag]) -> Result<String> {
        self.ensure_open()?;
        let path = name_for(tags)?;
        if self.manifest.contains(&path) {
            return Err(ArchiveError::DuplicateArtifact { path });
        }
        self.container.write_entry(&path, &mut content)?;
        self.manifest.insert(path.clone(), tags.to_vec())?;
        Ok(path)
    }

    /// Writes a sideband entry. Each sideband can be written once per archive.
    pub fn add_sideband(&mut self, sideband: Sideband, mut content: impl Read) -> Result<()> {
        self.ensure_open()?;
        if self.sidebands.contains(&sideband) {
            return Err(ArchiveError::DuplicateArtifact {
                path: sideband.path().to_string(),
            });
        }
        self.container.write_entry(sideband.path(), &mut content)?;
        self.sidebands.push(sideband);
        Ok(())
    }

    pub fn add_capture_metadata(&mut self, metadata: &CaptureMetadata) -> Result<()> {
        self.ensure_open()?;
        let encoded = encode_pretty(metadata, || "capture metadata".to_string())?;
        self.add_sideband(Sideband::CaptureMetadata, encoded.as_slice())
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Persists the manifest and finishes the container. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let manifest_path = name_for(&[Tag::manifest()])?;
        let encoded = self.manifest.to_json()?;
        self.container
            .write_entry(&manifest_path, &mut encoded.as_slice())?;
        self.container.finish()?;
        self.closed = true;
        tracing::debug!(artifacts = self.manifest.len(), "archive closed");
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(mut self) -> Result<C>
    where
        C: Default,
    {
        self.close()?;
        Ok(std::mem::take(&mut self.container))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed || self.container.is_finished() {
            return Err(ArchiveError::WriterClosed);
        }
        Ok(())
    }
}

impl<C: ContainerWriter> Drop for Writer<C> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                artifacts = self.manifest.len(),
                "archive writer dropped without close; the archive has no manifest"
            );
        }
    }
}

fn encode_pretty<T: Serialize + ?Sized>(
    value: &T,
    context: impl FnOnce() -> String,
) -> Result<Vec<u8>> {
    let mut encoded = serde_json::to_vec_pretty(value).map_err(|source| ArchiveError::Encode {
        context: context().into(),
        source,
    })?;
    encoded.push(b'\n');
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    /// Records entries in memory.
    #[derive(Default)]
    struct MemoryContainer {
        entries: BTreeMap<String, Vec<u8>>,
        finished: bool,
    }

    impl ContainerWriter for MemoryContainer {
        fn write_entry(&mut self, name: &str, content: &mut dyn Read) -> Result<u64> {
            let mut bytes = Vec::new();
            content.read_to_end(&mut bytes)?;
            let len = bytes.len() as u64;
            self.entries.insert(name.to_string(), bytes);
            Ok(len)
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    fn health_tags(server: &str) -> Vec<Tag> {
        vec![Tag::cluster("C1"), Tag::server(server), Tag::health()]
    }

    #[test]
    fn add_writes_indented_json_with_trailing_newline() {
        let mut writer = Writer::with_container(MemoryContainer::default());
        let path = writer
            .add(&serde_json::json!({"status": "ok"}), &health_tags("S1"))
            .unwrap();
        assert_eq!(path, "capture/clusters/C1/S1/health.json");

        let container = writer.into_inner().unwrap();
        let body = String::from_utf8(container.entries[&path].clone()).unwrap();
        assert_eq!(body, "{\n  \"status\": \"ok\"\n}\n");
        assert!(container.finished);
        assert!(container.entries.contains_key("capture/manifest.json"));
    }

    #[test]
    fn duplicate_tags_are_rejected_regardless_of_order() {
        let mut writer = Writer::with_container(MemoryContainer::default());
        writer.add(&1, &health_tags("S1")).unwrap();

        let mut reordered = health_tags("S1");
        reordered.reverse();
        let err = writer.add(&2, &reordered).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateArtifact { .. }));
        assert_eq!(writer.manifest().len(), 1);
        writer.close().unwrap();
    }

    #[test]
    fn sidebands_are_written_once_and_kept_out_of_the_manifest() {
        let mut writer = Writer::with_container(MemoryContainer::default());
        writer
            .add_sideband(Sideband::CaptureLog, &b"started\n"[..])
            .unwrap();
        let err = writer
            .add_sideband(Sideband::CaptureLog, &b"again\n"[..])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateArtifact { ref path } if path == "capture/capture.log"));

        writer
            .add_capture_metadata(&CaptureMetadata {
                timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
                connected_server_name: "S1".into(),
                connected_server_version: "2.10.4".into(),
                connect_url: "nats://127.0.0.1:4222".into(),
                user_name: "ops".into(),
                tool_version: "0.1.0".into(),
            })
            .unwrap();
        assert!(writer.manifest().is_empty());

        let container = writer.into_inner().unwrap();
        let info: serde_json::Value =
            serde_json::from_slice(&container.entries["capture/capture_info.json"]).unwrap();
        assert_eq!(info["connected_server_name"], "S1");
        assert_eq!(info["cli_version"], "0.1.0");
        assert!(info["capture_timestamp"].is_string());
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_writes() {
        let mut writer = Writer::with_container(MemoryContainer::default());
        writer.add(&1, &health_tags("S1")).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());

        let err = writer.add(&2, &health_tags("S2")).unwrap_err();
        assert!(matches!(err, ArchiveError::WriterClosed));
        let err = writer
            .add_sideband(Sideband::CaptureLog, &b""[..])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::WriterClosed));
    }

    #[test]
    fn invalid_tags_write_nothing() {
        let mut writer = Writer::with_container(MemoryContainer::default());
        let err = writer.add(&1, &[Tag::server("S1")]).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingRequiredTag { .. }));
        assert!(writer.manifest().is_empty());
        let container = writer.into_inner().unwrap();
        assert_eq!(container.entries.len(), 1);
    }

    #[test]
    fn sideband_paths_resolve_back() {
        for sideband in Sideband::ALL {
            assert_eq!(Sideband::from_path(sideband.path()), Some(sideband));
        }
        assert_eq!(Sideband::from_path("capture/manifest.json"), None);
    }
}
