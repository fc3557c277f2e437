//! Matcher - resolves leading bytes to a file type
//!
//! Flow for one file:
//!
//! 1. Read the header (32 bytes by default). Unreadable stops here.
//! 2. Walk the signature table in match order and take the first entry
//!    whose pattern is a prefix of the header.
//! 3. RIFF and ZIP matches are refined by [`container`] sniffing.
//! 4. With no match, a bounded sample is checked for plain text before
//!    giving up with `UNKNOWN`.
//!
//! A [`Detector`] only holds an `Arc` of the immutable table and its read
//! sizes, so one instance can serve any number of threads.

pub mod container;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::header::{
    read_header, ByteSource, HeaderRead, CONTAINER_WINDOW, HEADER_SIZE, TEXT_SAMPLE,
};
use crate::signatures::SignatureTable;
use container::Container;

/// Type tag reported when nothing matched
pub const UNKNOWN: &str = "UNKNOWN";

/// A resolved type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionResult {
    pub type_tag: String,
    pub description: String,
}

impl DetectionResult {
    pub fn new(type_tag: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            description: description.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN, "Unknown File")
    }

    pub fn text() -> Self {
        Self::new("TXT", "Text Document")
    }

    pub fn is_unknown(&self) -> bool {
        self.type_tag == UNKNOWN
    }
}

/// Outcome of detecting one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Detected(DetectionResult),
    /// The header could not be read; distinct from `UNKNOWN`
    Unreadable,
}

impl Detection {
    pub fn result(&self) -> Option<&DetectionResult> {
        match self {
            Detection::Detected(result) => Some(result),
            Detection::Unreadable => None,
        }
    }
}

/// Read sizes used during detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    /// Bytes read for the primary signature match
    pub header_size: usize,
    /// Bytes scanned for ZIP member markers
    pub container_window: usize,
    /// Bytes checked by the text fallback
    pub text_sample: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            header_size: HEADER_SIZE,
            container_window: CONTAINER_WINDOW,
            text_sample: TEXT_SAMPLE,
        }
    }
}

/// Signature matcher over a shared, read-only table
#[derive(Debug, Clone)]
pub struct Detector {
    table: Arc<SignatureTable>,
    options: DetectOptions,
}

impl Detector {
    pub fn new(table: Arc<SignatureTable>) -> Self {
        Self::with_options(table, DetectOptions::default())
    }

    pub fn with_options(table: Arc<SignatureTable>, options: DetectOptions) -> Self {
        Self { table, options }
    }

    pub fn table(&self) -> &SignatureTable {
        &self.table
    }

    pub fn options(&self) -> &DetectOptions {
        &self.options
    }

    /// Detect the type of `source` from its leading bytes
    pub fn detect(&self, source: &dyn ByteSource) -> Detection {
        match read_header(source, self.options.header_size) {
            HeaderRead::Bytes(header) => {
                Detection::Detected(self.detect_header(&header, source))
            }
            HeaderRead::Unreadable => {
                tracing::debug!(source = %source.name(), "Unable to read file");
                Detection::Unreadable
            }
        }
    }

    /// Match an already-read header. `source` is only consulted again for
    /// the ZIP window and the text sample.
    pub fn detect_header(&self, header: &[u8], source: &dyn ByteSource) -> DetectionResult {
        let Some(entry) = self.table.find_prefix(header) else {
            return self.fallback(header, source);
        };

        let generic = DetectionResult::new(entry.type_tag.clone(), entry.description.clone());
        let result = match Container::for_pattern(&entry.pattern) {
            Some(Container::Riff) => container::sniff_riff(header).unwrap_or(generic),
            Some(Container::Zip) => {
                let window = self.container_window(header, source);
                container::sniff_zip(&window)
            }
            None => generic,
        };

        tracing::debug!(
            source = %source.name(),
            type_tag = %result.type_tag,
            "Signature matched"
        );
        result
    }

    fn container_window(&self, header: &[u8], source: &dyn ByteSource) -> Vec<u8> {
        match source.read_prefix(self.options.container_window) {
            Ok(window) => window,
            Err(e) => {
                tracing::warn!(
                    source = %source.name(),
                    "Container window read failed, using header only: {}",
                    e
                );
                header.to_vec()
            }
        }
    }

    fn fallback(&self, header: &[u8], source: &dyn ByteSource) -> DetectionResult {
        let sample = if self.options.text_sample <= header.len() {
            header[..self.options.text_sample].to_vec()
        } else {
            match source.read_prefix(self.options.text_sample) {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!(source = %source.name(), "Text sample read failed: {}", e);
                    return DetectionResult::unknown();
                }
            }
        };

        if looks_like_text(&sample) {
            DetectionResult::text()
        } else {
            DetectionResult::unknown()
        }
    }
}

/// Non-empty, valid UTF-8 and free of control bytes other than common
/// whitespace and escape. A multi-byte character cut off by the end of the
/// sample is accepted.
pub fn looks_like_text(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }

    let valid = match std::str::from_utf8(sample) {
        Ok(_) => true,
        // error_len() is None only for a truncated sequence at the very end
        Err(e) => e.error_len().is_none() && sample.len() - e.valid_up_to() < 4,
    };

    valid
        && sample
            .iter()
            .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B))
        && !sample.contains(&0x7F)
}
