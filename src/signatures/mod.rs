//! Signature catalog loading and the in-memory signature table.
//!
//! A catalog is a plain text file with one signature per line:
//!
//! ```text
//! pattern | type_tag | description
//! ```
//!
//! `pattern` is decoded with [`decode_pattern`] straight from the line's
//! raw bytes, so the encoding of the catalog file never changes what a
//! pattern matches. Type tags and descriptions are read as UTF-8, falling
//! back to Latin-1 for fields that are not valid UTF-8. The description is
//! optional.
//!
//! Lines starting with `#` are comments. A pattern that begins with a
//! literal `#` (a `#!` script header, say) has to be written as `\x23!`.
//!
//! Loading never fails hard: an unreadable catalog gives an empty table
//! and malformed lines are skipped with a warning, so a bad catalog
//! degrades detection to `UNKNOWN` instead of taking the process down.

mod escape;

pub use escape::{decode_pattern, encode_pattern, EscapeError};

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest pattern accepted from a catalog
pub const MAX_PATTERN_LEN: usize = 16;

/// Description used when a catalog line omits one
pub const DEFAULT_DESCRIPTION: &str = "Unknown File Type";

/// Catalog compiled into the binary, used when no catalog path is configured
pub const BUILTIN_CATALOG: &str = include_str!("../../data/signatures");

/// A single magic-byte signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// Raw bytes that must appear at the start of the file
    pub pattern: Vec<u8>,
    /// Short identifier, compared against upper-cased file extensions
    pub type_tag: String,
    /// Human readable description
    pub description: String,
}

/// How overlapping patterns are ordered during matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrder {
    /// Catalog order; the first matching line wins
    #[default]
    Catalog,
    /// Longest pattern first, catalog order between equal lengths
    LongestFirst,
}

/// A problem with one catalog line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("line {line}: expected 'pattern | type | description', found {fields} field(s)")]
    MissingFields { line: usize, fields: usize },

    #[error("line {line}: empty pattern")]
    EmptyPattern { line: usize },

    #[error("line {line}: empty type tag")]
    EmptyTypeTag { line: usize },

    #[error("line {line}: pattern is {len} bytes, longer than {max}")]
    PatternTooLong { line: usize, len: usize, max: usize },

    #[error("line {line}: bad pattern: {source}")]
    BadPattern {
        line: usize,
        #[source]
        source: EscapeError,
    },

    #[error("cannot read catalog: {0}")]
    Unreadable(String),
}

/// Summary of a catalog load
#[derive(Debug, Clone, Default)]
pub struct CatalogReport {
    /// Lines that produced an entry (including ones that overwrote an earlier pattern)
    pub loaded: usize,
    /// Lines whose pattern replaced an earlier entry with the same bytes
    pub overwritten: usize,
    /// Lines that were skipped
    pub errors: Vec<CatalogError>,
}

impl CatalogReport {
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }
}

/// Immutable pattern -> (type, description) table
///
/// Entries keep catalog order. A pattern seen twice keeps the position of
/// its first occurrence and the contents of its last.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    entries: Vec<SignatureEntry>,
    by_pattern: HashMap<Vec<u8>, usize>,
    order: Vec<usize>,
    match_order: MatchOrder,
}

impl SignatureTable {
    /// Table with no signatures; every detection falls through to the text
    /// check or `UNKNOWN`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table built from the catalog compiled into the binary
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_CATALOG)
    }

    /// Parse catalog text, logging and skipping malformed lines
    pub fn parse(text: &str) -> Self {
        Self::parse_with_report(text).0
    }

    /// Parse catalog text and return the table along with what was skipped
    pub fn parse_with_report(text: &str) -> (Self, CatalogReport) {
        Self::parse_bytes_with_report(text.as_bytes())
    }

    /// Parse raw catalog bytes. Lines are split on `\n`; a trailing `\r` is
    /// dropped.
    pub fn parse_bytes_with_report(raw: &[u8]) -> (Self, CatalogReport) {
        let mut builder = TableBuilder::default();
        let mut report = CatalogReport::default();

        for (idx, line) in raw.split(|&b| b == b'\n').enumerate() {
            let line_no = idx + 1;
            match parse_line(line, line_no) {
                Ok(None) => {}
                Ok(Some(entry)) => {
                    if builder.insert(entry) {
                        report.overwritten += 1;
                    }
                    report.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(line = line_no, "Skipping catalog line: {}", e);
                    report.errors.push(e);
                }
            }
        }

        (builder.build(), report)
    }

    /// Load a catalog from any reader
    pub fn load<R: Read>(reader: R) -> Self {
        Self::load_with_report(reader).0
    }

    /// Load a catalog from any reader, returning the load summary as well
    pub fn load_with_report<R: Read>(mut reader: R) -> (Self, CatalogReport) {
        let mut raw = Vec::new();
        if let Err(e) = reader.read_to_end(&mut raw) {
            tracing::error!("Error loading signatures: {}", e);
            let report = CatalogReport {
                errors: vec![CatalogError::Unreadable(e.to_string())],
                ..Default::default()
            };
            return (Self::empty(), report);
        }

        let (table, report) = Self::parse_bytes_with_report(&raw);
        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped(),
            signatures = table.len(),
            "Loaded signature catalog"
        );
        (table, report)
    }

    /// Load a catalog file. A missing or unreadable file gives an empty table.
    pub fn load_from_path(path: &Path) -> Self {
        Self::load_from_path_with_report(path).0
    }

    pub fn load_from_path_with_report(path: &Path) -> (Self, CatalogReport) {
        match fs::File::open(path) {
            Ok(file) => Self::load_with_report(file),
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    "Error loading signatures: {}",
                    e
                );
                let report = CatalogReport {
                    errors: vec![CatalogError::Unreadable(format!(
                        "{}: {}",
                        path.display(),
                        e
                    ))],
                    ..Default::default()
                };
                (Self::empty(), report)
            }
        }
    }

    /// Same entries, different tie-break between overlapping patterns
    pub fn with_match_order(mut self, match_order: MatchOrder) -> Self {
        self.match_order = match_order;
        self.order = match match_order {
            MatchOrder::Catalog => (0..self.entries.len()).collect(),
            MatchOrder::LongestFirst => {
                let mut order: Vec<usize> = (0..self.entries.len()).collect();
                // stable sort keeps catalog order between equal lengths
                order.sort_by(|a, b| {
                    self.entries[*b]
                        .pattern
                        .len()
                        .cmp(&self.entries[*a].pattern.len())
                });
                order
            }
        };
        self
    }

    pub fn match_order(&self) -> MatchOrder {
        self.match_order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact pattern lookup
    pub fn get(&self, pattern: &[u8]) -> Option<&SignatureEntry> {
        self.by_pattern.get(pattern).map(|&i| &self.entries[i])
    }

    /// Entries in catalog order
    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    /// Entries in matching order
    pub fn iter(&self) -> impl Iterator<Item = &SignatureEntry> + '_ {
        self.order.iter().map(move |&i| &self.entries[i])
    }

    /// First entry (in matching order) whose pattern is a prefix of `header`
    pub fn find_prefix(&self, header: &[u8]) -> Option<&SignatureEntry> {
        self.iter().find(|entry| header.starts_with(&entry.pattern))
    }

    /// Longest pattern in the table, in bytes
    pub fn max_pattern_len(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.pattern.len())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Default)]
struct TableBuilder {
    entries: Vec<SignatureEntry>,
    by_pattern: HashMap<Vec<u8>, usize>,
}

impl TableBuilder {
    /// Returns true when an existing pattern was overwritten
    fn insert(&mut self, entry: SignatureEntry) -> bool {
        if let Some(&idx) = self.by_pattern.get(&entry.pattern) {
            tracing::debug!(
                pattern = %encode_pattern(&entry.pattern),
                old = %self.entries[idx].type_tag,
                new = %entry.type_tag,
                "Duplicate pattern, later entry wins"
            );
            self.entries[idx] = entry;
            return true;
        }
        self.by_pattern.insert(entry.pattern.clone(), self.entries.len());
        self.entries.push(entry);
        false
    }

    fn build(self) -> SignatureTable {
        let order = (0..self.entries.len()).collect();
        SignatureTable {
            entries: self.entries,
            by_pattern: self.by_pattern,
            order,
            match_order: MatchOrder::Catalog,
        }
    }
}

/// Parse one raw catalog line. Blank lines and `#` comments give `Ok(None)`.
pub fn parse_line(raw: &[u8], line: usize) -> Result<Option<SignatureEntry>, CatalogError> {
    let trimmed = trim_bytes(raw);
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed[0] == b'#' {
        if trimmed.contains(&b'|') {
            tracing::debug!(
                line,
                "Skipping comment that looks like a signature; write a leading # as \\x23"
            );
        }
        return Ok(None);
    }

    let fields = split_fields(trimmed);
    if fields.len() < 2 {
        return Err(CatalogError::MissingFields {
            line,
            fields: fields.len(),
        });
    }

    let pattern_text = trim_bytes(fields[0]);
    let type_tag = decode_field(trim_bytes(fields[1]));
    let description = fields
        .get(2)
        .map(|d| decode_field(trim_bytes(d)))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    if pattern_text.is_empty() {
        return Err(CatalogError::EmptyPattern { line });
    }
    if type_tag.is_empty() {
        return Err(CatalogError::EmptyTypeTag { line });
    }

    let pattern = decode_pattern(pattern_text)
        .map_err(|source| CatalogError::BadPattern { line, source })?;
    if pattern.is_empty() {
        return Err(CatalogError::EmptyPattern { line });
    }
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(CatalogError::PatternTooLong {
            line,
            len: pattern.len(),
            max: MAX_PATTERN_LEN,
        });
    }

    Ok(Some(SignatureEntry {
        pattern,
        type_tag,
        description,
    }))
}

/// Split on `|`, leaving `\|` inside the pattern field alone. Anything past
/// the third field is folded back into the description.
fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    let mut fields = Vec::with_capacity(3);
    let mut start = 0;
    let mut escaped = false;

    for (i, &b) in line.iter().enumerate() {
        if fields.len() == 2 {
            break;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'|' => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Text field: UTF-8 when valid, Latin-1 otherwise
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_line() {
        let entry = parse_line(b"%PDF | PDF | Portable Document Format", 1)
            .unwrap()
            .unwrap();
        assert_eq!(entry.pattern, b"%PDF");
        assert_eq!(entry.type_tag, "PDF");
        assert_eq!(entry.description, "Portable Document Format");
    }

    #[test]
    fn test_description_defaults() {
        let entry = parse_line(b"\\x7fELF|ELF", 3).unwrap().unwrap();
        assert_eq!(entry.pattern, b"\x7fELF");
        assert_eq!(entry.description, DEFAULT_DESCRIPTION);

        let entry = parse_line(b"BM | BMP |   ", 4).unwrap().unwrap();
        assert_eq!(entry.description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_comments_and_blanks_ignored() {
        assert_eq!(parse_line(b"", 1).unwrap(), None);
        assert_eq!(parse_line(b"   ", 1).unwrap(), None);
        assert_eq!(parse_line(b"# comment | X | Y", 1).unwrap(), None);
    }

    #[test]
    fn test_escaped_pipe_stays_in_pattern() {
        let entry = parse_line(b"a\\|b | PIPE | Pipe test", 1).unwrap().unwrap();
        assert_eq!(entry.pattern, b"a|b");
        assert_eq!(entry.type_tag, "PIPE");
    }

    #[test]
    fn test_extra_pipes_go_to_description() {
        let entry = parse_line(b"ABC | ABC | one | two", 1).unwrap().unwrap();
        assert_eq!(entry.description, "one | two");
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(
            parse_line(b"justapattern", 7),
            Err(CatalogError::MissingFields { line: 7, fields: 1 })
        );
        assert_eq!(
            parse_line(b" | PDF | x", 2),
            Err(CatalogError::EmptyPattern { line: 2 })
        );
        assert_eq!(
            parse_line(b"%PDF |  | x", 2),
            Err(CatalogError::EmptyTypeTag { line: 2 })
        );
        assert!(matches!(
            parse_line(b"\\xZZ | BAD", 5),
            Err(CatalogError::BadPattern { line: 5, .. })
        ));
        assert!(matches!(
            parse_line(b"0123456789abcdefg | LONG", 6),
            Err(CatalogError::PatternTooLong { len: 17, .. })
        ));
    }

    #[test]
    fn test_malformed_lines_do_not_abort_load() {
        let catalog = "%PDF | PDF | PDF\nbroken line\n\\x89PNG | PNG | PNG\n\\q | X\n";
        let (table, report) = SignatureTable::parse_with_report(catalog);
        assert_eq!(table.len(), 2);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped(), 2);
        assert!(table.get(b"%PDF").is_some());
        assert!(table.get(b"\x89PNG").is_some());
    }

    #[test]
    fn test_duplicate_pattern_last_write_wins() {
        let catalog = "AB | FIRST | one\nCD | OTHER | x\nAB | SECOND | two\n";
        let (table, report) = SignatureTable::parse_with_report(catalog);
        assert_eq!(table.len(), 2);
        assert_eq!(report.overwritten, 1);
        let entry = table.get(b"AB").unwrap();
        assert_eq!(entry.type_tag, "SECOND");
        assert_eq!(entry.description, "two");
        // keeps the position of the first occurrence
        assert_eq!(table.entries()[0].type_tag, "SECOND");
        assert_eq!(table.entries()[1].type_tag, "OTHER");
    }

    #[test]
    fn test_find_prefix_catalog_order() {
        let table = SignatureTable::parse("AB | SHORT\nABCD | LONG\n");
        assert_eq!(table.find_prefix(b"ABCDEF").unwrap().type_tag, "SHORT");
        assert!(table.find_prefix(b"XYZ").is_none());
    }

    #[test]
    fn test_find_prefix_longest_first() {
        let table = SignatureTable::parse("AB | SHORT\nABCD | LONG\nAC | OTHER\n")
            .with_match_order(MatchOrder::LongestFirst);
        assert_eq!(table.find_prefix(b"ABCDEF").unwrap().type_tag, "LONG");
        assert_eq!(table.find_prefix(b"ABXX").unwrap().type_tag, "SHORT");
        assert_eq!(table.find_prefix(b"ACXX").unwrap().type_tag, "OTHER");
        assert_eq!(table.match_order(), MatchOrder::LongestFirst);
    }

    #[test]
    fn test_pattern_longer_than_header_never_matches() {
        let table = SignatureTable::parse("ABCDEFGH | LONG\n");
        assert!(table.find_prefix(b"ABC").is_none());
    }

    #[test]
    fn test_latin1_catalog_bytes() {
        // 0xFF 0xD8 written raw in a Latin-1 file
        let raw: &[u8] = b"\xff\xd8\xff | JPEG | JPEG Image\n";
        let table = SignatureTable::load(raw);
        assert_eq!(table.get(&[0xFF, 0xD8, 0xFF]).unwrap().type_tag, "JPEG");
    }

    #[test]
    fn test_raw_pattern_bytes_do_not_depend_on_other_lines() {
        let utf8_only: &[u8] = b"\xc3\xa9t\xc3\xa9 | ETE | test\n";
        let mixed: &[u8] = b"\xc3\xa9t\xc3\xa9 | ETE | test\n\xff\xfb | MP3 | MPEG Audio\n";

        let (alone, _) = SignatureTable::parse_bytes_with_report(utf8_only);
        let (with_binary_line, _) = SignatureTable::parse_bytes_with_report(mixed);

        let expected = [0xC3, 0xA9, b't', 0xC3, 0xA9];
        assert_eq!(alone.entries()[0].pattern, expected);
        assert_eq!(with_binary_line.entries()[0].pattern, expected);
        assert_eq!(with_binary_line.get(&[0xFF, 0xFB]).unwrap().type_tag, "MP3");
        let from_str = SignatureTable::parse("\u{e9}t\u{e9} | ETE");
        assert_eq!(from_str.entries()[0].pattern, expected);
    }

    #[test]
    fn test_text_fields_fall_back_to_latin1_per_field() {
        let raw: &[u8] = b"AB | X | caf\xe9\nCD | Y | caf\xc3\xa9\r\n";
        let (table, report) = SignatureTable::parse_bytes_with_report(raw);
        assert!(report.errors.is_empty());
        assert_eq!(table.get(b"AB").unwrap().description, "caf\u{e9}");
        assert_eq!(table.get(b"CD").unwrap().description, "caf\u{e9}");
    }

    #[test]
    fn test_hash_pattern_needs_escape() {
        let catalog = "#!/bin | SH\n\\x23!/bin | SH\n";
        let (table, report) = SignatureTable::parse_with_report(catalog);
        assert!(report.errors.is_empty());
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries()[0].pattern, b"#!/bin");
    }

    #[test]
    fn test_missing_catalog_gives_empty_table() {
        let (table, report) =
            SignatureTable::load_from_path_with_report(Path::new("/nonexistent/signatures"));
        assert!(table.is_empty());
        assert!(matches!(report.errors[0], CatalogError::Unreadable(_)));
    }

    #[test]
    fn test_builtin_catalog_is_clean() {
        let (table, report) = SignatureTable::parse_with_report(BUILTIN_CATALOG);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(table.len() > 40);
        assert_eq!(table.get(b"RIFF").unwrap().type_tag, "RIFF");
        assert_eq!(table.get(b"PK\x03\x04").unwrap().type_tag, "ZIP");
        assert_eq!(table.get(b"{\\rtf").unwrap().type_tag, "RTF");
        assert_eq!(table.get(b"#!").unwrap().type_tag, "SH");
        assert!(table.max_pattern_len() <= MAX_PATTERN_LEN);
    }
}
