//! clustercap-core: a tagged, queryable archive of cluster diagnostics.
//!
//! A capture is a single zip file. [`Writer`] stores each artifact under a
//! path computed from its [`Tag`]s and persists a manifest on close;
//! [`Reader`] validates the manifest, builds topology indexes and answers tag
//! queries. The [`gather`] module fills a writer from a live cluster.

pub mod container;
pub mod error;
pub mod gather;
pub mod index;
pub mod manifest;
pub mod model;
pub mod reader;
pub mod tag;
pub mod writer;

pub use container::{
    ContainerReader, ContainerWriter, EntryInfo, ZipContainerReader, ZipContainerWriter,
};
pub use error::{ArchiveError, GatherError, Result};
pub use index::TopologyIndex;
pub use manifest::Manifest;
pub use reader::{IntegrityWarning, Reader};
pub use tag::{MANIFEST_PATH, NO_CLUSTER, ROOT_PREFIX, Tag, TagLabel, artifact, name_for};
pub use writer::{CaptureMetadata, Sideband, Writer};
