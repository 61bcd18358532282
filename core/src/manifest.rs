//! The persisted index of an archive: artifact path to the tags it was added with.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::tag::Tag;

/// Mapping from canonical artifact path to its tag list.
///
/// Serialized as a single JSON object keyed by path. Keys are kept sorted so
/// the same content always produces the same document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, Vec<Tag>>,
}

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn tags(&self, path: &str) -> Option<&[Tag]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<Tag>> {
        self.entries.iter()
    }

    /// Records `path`, refusing to replace an existing entry.
    pub(crate) fn insert(&mut self, path: String, tags: Vec<Tag>) -> Result<()> {
        match self.entries.entry(path) {
            btree_map::Entry::Occupied(entry) => Err(ArchiveError::DuplicateArtifact {
                path: entry.key().clone(),
            }),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(tags);
                Ok(())
            }
        }
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>> {
        let mut encoded =
            serde_json::to_vec_pretty(self).map_err(|source| ArchiveError::Encode {
                context: "manifest".into(),
                source,
            })?;
        encoded.push(b'\n');
        Ok(encoded)
    }

    pub(crate) fn from_reader(reader: impl Read) -> Result<Self> {
        serde_json::from_reader(reader).map_err(|source| ArchiveError::ManifestDecode { source })
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = (&'a String, &'a Vec<Tag>);
    type IntoIter = btree_map::Iter<'a, String, Vec<Tag>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_refuses_duplicates() {
        let mut manifest = Manifest::new();
        manifest
            .insert("capture/a.json".into(), vec![Tag::server("S1")])
            .unwrap();
        let err = manifest
            .insert("capture/a.json".into(), vec![Tag::server("S2")])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateArtifact { ref path } if path == "capture/a.json"));
        assert_eq!(manifest.tags("capture/a.json"), Some(&[Tag::server("S1")][..]));
    }

    #[test]
    fn json_document_is_sorted_and_round_trips() {
        let mut manifest = Manifest::new();
        manifest
            .insert("capture/b.json".into(), vec![Tag::server("S2"), Tag::health()])
            .unwrap();
        manifest
            .insert("capture/a.json".into(), vec![Tag::server("S1"), Tag::health()])
            .unwrap();

        let encoded = manifest.to_json().unwrap();
        let text = String::from_utf8(encoded.clone()).unwrap();
        let first = text.find("capture/a.json").unwrap();
        let second = text.find("capture/b.json").unwrap();
        assert!(first < second);
        assert!(text.contains(r#""Name": "server""#));

        let decoded = Manifest::from_reader(encoded.as_slice()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn unknown_label_fails_to_decode() {
        let doc = r#"{"capture/x.json": [{"Name": "color", "Value": "red"}]}"#;
        let err = Manifest::from_reader(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, ArchiveError::ManifestDecode { .. }));
    }
}
