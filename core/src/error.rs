use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

use crate::tag::TagLabel;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Canonical error surface for clustercap-core.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("at least one tag is required")]
    EmptyTags,

    #[error("tag '{label}' is special and should not be combined with other tags")]
    SpecialTagCombined { label: TagLabel },

    #[error("multiple values not allowed for tag '{label}'")]
    MultipleValues { label: TagLabel },

    #[error("missing required tag: {label}")]
    MissingRequiredTag { label: TagLabel },

    #[error("incompatible tags: {reason}")]
    IncompatibleTags { reason: Cow<'static, str> },

    #[error("artifact {path} with identical tags is already present")]
    DuplicateArtifact { path: String },

    #[error("attempting to write into a closed writer")]
    WriterClosed,

    #[error("attempting to read from a closed reader")]
    ReaderClosed,

    #[error("I/O error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("{context}: {source}")]
    Container {
        context: Cow<'static, str>,
        source: zip::result::ZipError,
    },

    #[error("failed to encode {context}: {source}")]
    Encode {
        context: Cow<'static, str>,
        source: serde_json::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },

    #[error("manifest file not found in archive {archive:?}")]
    ManifestNotFound { archive: Option<PathBuf> },

    #[error("failed to load manifest: {source}")]
    ManifestDecode { source: serde_json::Error },

    #[error("file {path} is in manifest, but not present in archive")]
    MissingEntry { path: String },

    #[error("artifact {path} not found in archive")]
    NotFound { path: String },

    #[error("no artifact matched the given query [{query}]")]
    NoMatches { query: String },

    #[error("{count} artifacts matched the given query [{query}]")]
    MultipleMatches { query: String, count: usize },

    #[error("container handle lock was poisoned")]
    Poisoned,
}

impl ArchiveError {
    /// True for the expected "nothing captured" outcome of a query.
    #[must_use]
    pub fn is_no_matches(&self) -> bool {
        matches!(self, Self::NoMatches { .. })
    }

    #[must_use]
    pub fn is_multiple_matches(&self) -> bool {
        matches!(self, Self::MultipleMatches { .. })
    }

    pub(crate) fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    pub(crate) fn container(
        context: impl Into<Cow<'static, str>>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Container {
            context: context.into(),
            source,
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

/// Failures of a gather run. Only transport failures during discovery and
/// archive errors abort a run; everything else is logged and skipped.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("request to {subject} failed: {reason}")]
    Transport { subject: String, reason: String },

    #[error("failed to encode request to {subject}: {source}")]
    Encode {
        subject: String,
        source: serde_json::Error,
    },

    #[error("failed to decode response to {subject}: {source}")]
    Decode {
        subject: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
