//! Named-blob container adapters.
//!
//! The writer and reader only need to create, enumerate and stream named
//! entries; everything tag-aware lives above this layer. The zip format is the
//! one container shipped here.

use std::io::{self, BufReader, BufWriter, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ArchiveError, Result};

/// Name and uncompressed size of a container entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Write side of a container: one streamed entry at a time, then `finish`.
pub trait ContainerWriter {
    /// Creates `name` and copies `content` into it, returning the byte count.
    fn write_entry(&mut self, name: &str, content: &mut dyn Read) -> Result<u64>;

    /// Flushes and closes the container. Calling it again is a no-op.
    fn finish(&mut self) -> Result<()>;

    fn is_finished(&self) -> bool;
}

/// Read side of a container.
pub trait ContainerReader {
    fn entries(&self) -> &[EntryInfo];

    /// Opens `name` for reading; `NotFound` if the container has no such entry.
    fn open_entry(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    /// Releases the underlying handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    fn location(&self) -> Option<&Path> {
        None
    }
}

type ZipFileWriter = ZipWriter<BufWriter<fs_err::File>>;

pub struct ZipContainerWriter {
    path: PathBuf,
    inner: Option<ZipFileWriter>,
    options: SimpleFileOptions,
}

impl ZipContainerWriter {
    /// Creates (or truncates) the zip file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs_err::File::create(&path).map_err(|err| ArchiveError::io_at(err, &path))?;
        Ok(Self {
            path,
            inner: Some(ZipWriter::new(BufWriter::new(file))),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContainerWriter for ZipContainerWriter {
    fn write_entry(&mut self, name: &str, content: &mut dyn Read) -> Result<u64> {
        let writer = self.inner.as_mut().ok_or(ArchiveError::WriterClosed)?;
        writer
            .start_file(name, self.options)
            .map_err(|err| ArchiveError::container(format!("failed to create {name} in archive"), err))?;
        let written = io::copy(content, writer).map_err(|err| ArchiveError::io_at(err, &self.path))?;
        tracing::debug!(entry = name, bytes = written, "wrote container entry");
        Ok(written)
    }

    fn finish(&mut self) -> Result<()> {
        let Some(writer) = self.inner.take() else {
            return Ok(());
        };
        let buffered = writer
            .finish()
            .map_err(|err| ArchiveError::container("failed to close archive zip writer", err))?;
        let file = buffered
            .into_inner()
            .map_err(|err| ArchiveError::io_at(err.into_error(), &self.path))?;
        file.sync_all()
            .map_err(|err| ArchiveError::io_at(err, &self.path))?;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.inner.is_none()
    }
}

type ZipFileReader = ZipArchive<BufReader<fs_err::File>>;

pub struct ZipContainerReader {
    path: PathBuf,
    entries: Vec<EntryInfo>,
    // Zip entries borrow the archive mutably while open, so reads go through a lock.
    archive: Option<Mutex<ZipFileReader>>,
}

impl ZipContainerReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs_err::File::open(&path).map_err(|err| ArchiveError::io_at(err, &path))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|err| ArchiveError::container("failed to open archive", err))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|err| ArchiveError::container("failed to list archive entries", err))?;
            entries.push(EntryInfo {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
            });
        }

        Ok(Self {
            path,
            entries,
            archive: Some(Mutex::new(archive)),
        })
    }
}

impl ContainerReader for ZipContainerReader {
    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn open_entry(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let archive = self.archive.as_ref().ok_or(ArchiveError::ReaderClosed)?;
        let mut archive = archive.lock().map_err(|_| ArchiveError::Poisoned)?;
        let mut entry = archive.by_name(name).map_err(|err| match err {
            ZipError::FileNotFound => ArchiveError::NotFound {
                path: name.to_string(),
            },
            other => ArchiveError::container(format!("failed to open {name}"), other),
        })?;

        let capacity = usize::try_from(entry.size()).unwrap_or(0);
        let mut buffer = Vec::with_capacity(capacity);
        entry
            .read_to_end(&mut buffer)
            .map_err(|err| ArchiveError::io_at(err, &self.path))?;
        Ok(Box::new(Cursor::new(buffer)))
    }

    fn close(&mut self) -> Result<()> {
        self.archive = None;
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
