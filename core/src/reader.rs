//! Archive reader: manifest validation, derived indexes and tag queries.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::container::{ContainerReader, EntryInfo, ZipContainerReader};
use crate::error::{ArchiveError, Result};
use crate::index::TopologyIndex;
use crate::manifest::Manifest;
use crate::tag::{MANIFEST_PATH, Tag, describe, name_for};
use crate::writer::Sideband;

/// A container entry the manifest does not account for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    UntrackedEntry { path: String },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityWarning::UntrackedEntry { path } => {
                write!(f, "archive file {path} is not present in manifest")
            }
        }
    }
}

/// Read-only view of a closed archive.
///
/// All queries take `&self`; the indexes are fixed at open time and container
/// access is serialized by the container itself.
pub struct Reader<C: ContainerReader = ZipContainerReader> {
    container: C,
    // entry name -> uncompressed size
    entry_sizes: HashMap<String, u64>,
    manifest: Manifest,
    index: TopologyIndex,
    warnings: Vec<IntegrityWarning>,
    closed: bool,
}

impl Reader<ZipContainerReader> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_container(ZipContainerReader::open(path)?)
    }
}

impl<C: ContainerReader> Reader<C> {
    /// Loads and validates the manifest of `container`, then builds the indexes.
    pub fn from_container(container: C) -> Result<Self> {
        let entry_sizes: HashMap<String, u64> = container
            .entries()
            .iter()
            .map(|entry| (entry.name.clone(), entry.size))
            .collect();

        let manifest_path = name_for(&[Tag::manifest()])?;
        if !entry_sizes.contains_key(&manifest_path) {
            return Err(ArchiveError::ManifestNotFound {
                archive: container.location().map(Path::to_path_buf),
            });
        }
        let manifest = Manifest::from_reader(container.open_entry(&manifest_path)?)?;

        for path in manifest.paths() {
            if !entry_sizes.contains_key(path) {
                return Err(ArchiveError::MissingEntry {
                    path: path.to_string(),
                });
            }
        }

        let warnings: Vec<IntegrityWarning> = container
            .entries()
            .iter()
            .filter(|entry| is_untracked(entry, &manifest))
            .map(|entry| IntegrityWarning::UntrackedEntry {
                path: entry.name.clone(),
            })
            .collect();
        for warning in &warnings {
            tracing::warn!("{warning}");
        }

        let index = TopologyIndex::build(&manifest);
        tracing::debug!(
            artifacts = manifest.len(),
            entries = container.entries().len(),
            "opened archive"
        );

        Ok(Self {
            container,
            entry_sizes,
            manifest,
            index,
            warnings,
            closed: false,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.container.location()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Every raw container entry, including the manifest and sidebands.
    pub fn entries(&self) -> &[EntryInfo] {
        self.container.entries()
    }

    pub fn integrity_warnings(&self) -> &[IntegrityWarning] {
        &self.warnings
    }

    /// Opens the entry at `path` and returns it with its uncompressed size.
    pub fn get_raw(&self, path: &str) -> Result<(Box<dyn Read + Send>, u64)> {
        if self.closed {
            return Err(ArchiveError::ReaderClosed);
        }
        let size = self
            .entry_sizes
            .get(path)
            .copied()
            .ok_or_else(|| ArchiveError::NotFound {
                path: path.to_string(),
            })?;
        let reader = self.container.open_entry(path)?;
        Ok((reader, size))
    }

    /// Decodes the JSON entry at `path`.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (reader, _) = self.get_raw(path)?;
        serde_json::from_reader(reader).map_err(|source| ArchiveError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// Paths of every artifact carrying all of `query`, sorted.
    ///
    /// An empty query matches every artifact.
    pub fn find(&self, query: &[Tag]) -> Vec<String> {
        // Linear scan; manifests are small enough that an inverted index has not paid off.
        self.manifest
            .iter()
            .filter(|(_, tags)| query.iter().all(|wanted| tags.contains(wanted)))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Decodes the single artifact matching `query`.
    pub fn load<T: DeserializeOwned>(&self, query: &[Tag]) -> Result<T> {
        let mut matches = self.find(query);
        match matches.len() {
            0 => Err(ArchiveError::NoMatches {
                query: describe(query),
            }),
            1 => {
                let path = matches.swap_remove(0);
                self.get(&path)
            }
            count => Err(ArchiveError::MultipleMatches {
                query: describe(query),
                count,
            }),
        }
    }

    pub fn list_server_tags(&self) -> Vec<Tag> {
        self.index.server_tags()
    }

    pub fn list_cluster_tags(&self) -> Vec<Tag> {
        self.index.cluster_tags()
    }

    pub fn list_account_tags(&self) -> Vec<Tag> {
        self.index.account_tags()
    }

    pub fn list_stream_tags(&self) -> Vec<Tag> {
        self.index.stream_tags()
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.index.cluster_names()
    }

    pub fn cluster_server_names(&self, cluster: &str) -> Vec<String> {
        self.index.cluster_server_names(cluster)
    }

    pub fn account_names(&self) -> Vec<String> {
        self.index.account_names()
    }

    pub fn account_stream_names(&self, account: &str) -> Vec<String> {
        self.index.account_stream_names(account)
    }

    pub fn stream_server_names(&self, account: &str, stream: &str) -> Vec<String> {
        self.index.stream_server_names(account, stream)
    }

    /// Releases the container. Later calls do nothing; later reads fail.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.container.close()
    }
}

fn is_untracked(entry: &EntryInfo, manifest: &Manifest) -> bool {
    !(entry.is_dir
        || entry.name == MANIFEST_PATH
        || Sideband::from_path(&entry.name).is_some()
        || manifest.contains(&entry.name))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Cursor;

    use super::*;

    #[derive(Default)]
    struct MemoryContainer {
        files: BTreeMap<String, Vec<u8>>,
        infos: Vec<EntryInfo>,
        closed: bool,
    }

    impl MemoryContainer {
        fn with(mut self, name: &str, content: &str) -> Self {
            self.files.insert(name.to_string(), content.as_bytes().to_vec());
            self.infos.push(EntryInfo {
                name: name.to_string(),
                size: content.len() as u64,
                is_dir: false,
            });
            self
        }
    }

    impl ContainerReader for MemoryContainer {
        fn entries(&self) -> &[EntryInfo] {
            &self.infos
        }

        fn open_entry(&self, name: &str) -> Result<Box<dyn Read + Send>> {
            if self.closed {
                return Err(ArchiveError::ReaderClosed);
            }
            let bytes = self.files.get(name).ok_or_else(|| ArchiveError::NotFound {
                path: name.to_string(),
            })?;
            Ok(Box::new(Cursor::new(bytes.clone())))
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    const HEALTH_PATH: &str = "capture/clusters/C1/S1/health.json";

    fn single_artifact_manifest() -> String {
        format!(r#"{{"{HEALTH_PATH}": [{{"Name":"cluster","Value":"C1"}},{{"Name":"server","Value":"S1"}},{{"Name":"artifact_type","Value":"health"}}]}}"#)
    }

    #[test]
    fn untracked_entries_become_warnings() {
        let container = MemoryContainer::default()
            .with(MANIFEST_PATH, &single_artifact_manifest())
            .with(HEALTH_PATH, r#"{"status":"ok"}"#)
            .with("capture/capture.log", "hello\n")
            .with("capture/stray.json", "{}");
        let reader = Reader::from_container(container).unwrap();
        assert_eq!(
            reader.integrity_warnings(),
            [IntegrityWarning::UntrackedEntry {
                path: "capture/stray.json".into()
            }]
        );
        assert_eq!(reader.cluster_server_names("C1"), ["S1"]);
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let container = MemoryContainer::default().with(HEALTH_PATH, "{}");
        let err = Reader::from_container(container).err().unwrap();
        assert!(matches!(err, ArchiveError::ManifestNotFound { archive: None }));
    }

    #[test]
    fn manifest_path_missing_from_container_is_an_error() {
        let container = MemoryContainer::default().with(MANIFEST_PATH, &single_artifact_manifest());
        let err = Reader::from_container(container).err().unwrap();
        assert!(matches!(err, ArchiveError::MissingEntry { ref path } if path == HEALTH_PATH));
    }

    #[test]
    fn reads_fail_after_close() {
        let container = MemoryContainer::default()
            .with(MANIFEST_PATH, &single_artifact_manifest())
            .with(HEALTH_PATH, r#"{"status":"ok"}"#);
        let mut reader = Reader::from_container(container).unwrap();
        let (_, size) = reader.get_raw(HEALTH_PATH).unwrap();
        assert_eq!(size, 15);

        reader.close().unwrap();
        reader.close().unwrap();
        assert!(matches!(
            reader.get_raw(HEALTH_PATH).err().unwrap(),
            ArchiveError::ReaderClosed
        ));
        assert_eq!(reader.find(&[Tag::health()]), [HEALTH_PATH]);
    }

    #[test]
    fn get_raw_reports_entry_sizes_and_rejects_unknown_paths() {
        let container = MemoryContainer::default()
            .with(MANIFEST_PATH, &single_artifact_manifest())
            .with(HEALTH_PATH, r#"{"status":"ok"}"#)
            .with("capture/capture.log", "hello\n");
        let reader = Reader::from_container(container).unwrap();

        let (_, size) = reader.get_raw(HEALTH_PATH).unwrap();
        assert_eq!(size, 15);
        let (mut log, size) = reader.get_raw("capture/capture.log").unwrap();
        assert_eq!(size, 6);
        let mut text = String::new();
        log.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\n");

        let err = reader.get_raw("capture/clusters/C1/S2/health.json").err().unwrap();
        assert!(matches!(err, ArchiveError::NotFound { .. }));
    }

    #[test]
    fn decode_errors_name_the_path() {
        let container = MemoryContainer::default()
            .with(MANIFEST_PATH, &single_artifact_manifest())
            .with(HEALTH_PATH, "not json");
        let reader = Reader::from_container(container).unwrap();
        let err = reader.get::<serde_json::Value>(HEALTH_PATH).unwrap_err();
        assert!(matches!(err, ArchiveError::Decode { ref path, .. } if path == HEALTH_PATH));
    }
}
