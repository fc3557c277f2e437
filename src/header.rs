//! Header Reader - bounded, read-only access to a file's leading bytes
//!
//! Detection never needs the whole file. Every read goes through a
//! [`ByteSource`], which opens the target, reads at most the requested
//! number of bytes from the start and closes it again.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

/// Default primary header size
pub const HEADER_SIZE: usize = 32;

/// Default window scanned when disambiguating ZIP containers
pub const CONTAINER_WINDOW: usize = 2048;

/// Default sample size for the text fallback
pub const TEXT_SAMPLE: usize = 1024;

/// Something detection can read a bounded prefix from
pub trait ByteSource: Send + Sync {
    /// Read up to `max` bytes from the start. Fewer bytes means the content
    /// is shorter than `max`.
    fn read_prefix(&self, max: usize) -> io::Result<Vec<u8>>;

    /// Label used in logs
    fn name(&self) -> String;
}

/// A stored file on disk, opened read-only for each read
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ByteSource for FileSource {
    fn read_prefix(&self, max: usize) -> io::Result<Vec<u8>> {
        let file = File::open(&self.path)?;
        read_bounded(file, max)
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Content already in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

impl ByteSource for MemorySource {
    fn read_prefix(&self, max: usize) -> io::Result<Vec<u8>> {
        Ok(self.data[..self.data.len().min(max)].to_vec())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Outcome of a header read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderRead {
    /// Leading bytes; empty for an empty file
    Bytes(Vec<u8>),
    /// The source could not be opened or read
    Unreadable,
}

/// Read at most `size` bytes from the start of `source`
///
/// Missing files, permission errors and I/O failures all collapse into
/// [`HeaderRead::Unreadable`].
pub fn read_header(source: &dyn ByteSource, size: usize) -> HeaderRead {
    match source.read_prefix(size) {
        Ok(bytes) => HeaderRead::Bytes(bytes),
        Err(e) => {
            tracing::debug!(source = %source.name(), "Header read failed: {}", e);
            HeaderRead::Unreadable
        }
    }
}

/// Read until `max` bytes or EOF, tolerating short reads
fn read_bounded<R: Read>(reader: R, max: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(max.min(64 * 1024));
    reader.take(max as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
