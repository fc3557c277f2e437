//! Container disambiguation for RIFF and ZIP envelopes
//!
//! Both formats wrap many different payloads behind one outer magic. RIFF
//! carries a four byte form type right after the size field; OOXML
//! documents are ZIP archives whose member paths give the application
//! away, and for small files those names sit within the first couple of
//! kilobytes.

use super::DetectionResult;

/// Outer RIFF marker
pub const RIFF_MAGIC: &[u8] = b"RIFF";

/// ZIP local file header
pub const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Which envelope a matched signature opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Riff,
    Zip,
}

impl Container {
    /// Classify a matched signature pattern
    pub fn for_pattern(pattern: &[u8]) -> Option<Self> {
        if pattern.starts_with(RIFF_MAGIC) {
            Some(Container::Riff)
        } else if pattern.starts_with(ZIP_MAGIC) {
            Some(Container::Zip)
        } else {
            None
        }
    }
}

/// Known RIFF form types at bytes 8..12
const RIFF_FORMS: &[(&[u8; 4], &str, &str)] = &[
    (b"WEBP", "WEBP", "WebP Image"),
    (b"AVI ", "AVI", "AVI Video"),
    (b"WAVE", "WAV", "WAV Audio"),
];

/// Member path markers, checked in this order
const OOXML_MARKERS: &[(&[u8], &str, &str)] = &[
    (b"word/", "DOCX", "Microsoft Word Document"),
    (b"xl/", "XLSX", "Microsoft Excel Spreadsheet"),
    (b"ppt/", "PPTX", "Microsoft PowerPoint Presentation"),
];

/// Resolve a RIFF header to its form type. `None` when the form type is
/// missing or unrecognised; the caller keeps the generic RIFF entry.
pub fn sniff_riff(header: &[u8]) -> Option<DetectionResult> {
    let form = header.get(8..12)?;
    RIFF_FORMS
        .iter()
        .find(|(tag, _, _)| form == &tag[..])
        .map(|(_, type_tag, description)| DetectionResult::new(*type_tag, *description))
}

/// Resolve a ZIP window to an Office package or a plain archive
pub fn sniff_zip(window: &[u8]) -> DetectionResult {
    OOXML_MARKERS
        .iter()
        .find(|(marker, _, _)| contains(window, marker))
        .map(|(_, type_tag, description)| DetectionResult::new(*type_tag, *description))
        .unwrap_or_else(|| DetectionResult::new("ZIP", "ZIP Archive"))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
