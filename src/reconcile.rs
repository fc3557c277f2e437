//! Extension Reconciler - compares a detected type with the extension a
//! filename claims
//!
//! Rules, first match wins:
//!
//! | detection        | claimed extension        | mismatch |
//! |------------------|--------------------------|----------|
//! | unreadable       | any                      | no       |
//! | `UNKNOWN`        | any                      | no       |
//! | type `X`         | `NONE`                   | yes      |
//! | type `X`         | `X`                      | no       |
//! | type `X`         | registered synonym of X  | no       |
//! | type `X`         | anything else            | yes      |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::reputation::ReputationReport;

/// Claimed extension for a filename without a suffix
pub const NO_EXTENSION: &str = "NONE";

/// Synonymous extension pairs accepted out of the box
pub const DEFAULT_SYNONYMS: &[(&str, &str)] = &[("JPG", "JPEG"), ("HTM", "HTML"), ("TIF", "TIFF")];

/// Which reconciliation rule produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Unreadable,
    Unknown,
    MissingExtension,
    Match,
    Variation,
    Mismatch,
}

impl VerdictStatus {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, VerdictStatus::MissingExtension | VerdictStatus::Mismatch)
    }
}

/// Reconciliation result for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub filename: String,
    /// Upper-cased claimed extension, or `NONE`
    pub extension: String,
    /// `None` only when the file could not be read
    pub detected_type: Option<String>,
    pub detected_description: String,
    pub mismatch: bool,
    pub message: String,
    pub status: VerdictStatus,
    /// Reputation lookup, attached by the caller after reconciliation
    #[serde(rename = "virustotal", skip_serializing_if = "Option::is_none", default)]
    pub reputation: Option<ReputationReport>,
}

impl Verdict {
    pub fn is_unreadable(&self) -> bool {
        self.status == VerdictStatus::Unreadable
    }

    /// Attach a reputation report; `mismatch` and `message` are left as-is
    pub fn with_reputation(mut self, report: ReputationReport) -> Self {
        self.reputation = Some(report);
        self
    }
}

/// Upper-cased suffix after the last `.` of the final path component, or
/// `NONE`. Leading dots do not start an extension (`.bashrc` has none).
pub fn claimed_extension(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let stem_start = base.len() - base.trim_start_matches('.').len();

    match base[stem_start..].rfind('.') {
        Some(dot) => {
            let ext = &base[stem_start + dot + 1..];
            if ext.is_empty() {
                NO_EXTENSION.to_string()
            } else {
                ext.to_uppercase()
            }
        }
        None => NO_EXTENSION.to_string(),
    }
}

/// Applies the decision table with a symmetric synonym set
#[derive(Debug, Clone)]
pub struct Reconciler {
    synonyms: HashSet<(String, String)>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::with_synonyms(DEFAULT_SYNONYMS.iter().copied())
    }
}

impl Reconciler {
    /// Reconciler with exactly these synonym pairs (plus their reverse)
    pub fn with_synonyms<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut reconciler = Self {
            synonyms: HashSet::new(),
        };
        reconciler.add_synonyms(pairs);
        reconciler
    }

    /// Register more synonym pairs
    pub fn add_synonyms<I, A, B>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        for (a, b) in pairs {
            let a = a.as_ref().to_uppercase();
            let b = b.as_ref().to_uppercase();
            self.synonyms.insert((b.clone(), a.clone()));
            self.synonyms.insert((a, b));
        }
    }

    pub fn are_synonyms(&self, extension: &str, type_tag: &str) -> bool {
        self.synonyms
            .contains(&(extension.to_uppercase(), type_tag.to_uppercase()))
    }

    /// Build the verdict for `filename` given what detection found
    pub fn reconcile(&self, filename: &str, detection: &Detection) -> Verdict {
        let extension = claimed_extension(filename);

        let Some(result) = detection.result() else {
            return Verdict {
                filename: filename.to_string(),
                extension,
                detected_type: None,
                detected_description: String::new(),
                mismatch: false,
                message: "Unable to read file.".to_string(),
                status: VerdictStatus::Unreadable,
                reputation: None,
            };
        };

        let detected = result.type_tag.as_str();
        let (status, message) = if result.is_unknown() {
            (
                VerdictStatus::Unknown,
                "This type of file is not in our database.".to_string(),
            )
        } else if extension == NO_EXTENSION {
            (
                VerdictStatus::MissingExtension,
                format!("This file has no extension, but we detected: `{}`.", detected),
            )
        } else if extension.eq_ignore_ascii_case(detected) {
            (
                VerdictStatus::Match,
                format!("This file's extension matches what we detected: `{}`.", detected),
            )
        } else if self.are_synonyms(&extension, detected) {
            (
                VerdictStatus::Variation,
                format!(
                    "This file's extension is a variation of what we detected: `{}`.",
                    detected
                ),
            )
        } else {
            (
                VerdictStatus::Mismatch,
                format!(
                    "This file's extension claims `{}` but we detected: `{}`.",
                    extension, detected
                ),
            )
        };

        if status.is_mismatch() {
            tracing::info!(
                filename,
                extension = %extension,
                detected,
                "Extension mismatch"
            );
        }

        Verdict {
            filename: filename.to_string(),
            extension,
            detected_type: Some(result.type_tag.clone()),
            detected_description: result.description.clone(),
            mismatch: status.is_mismatch(),
            message,
            status,
            reputation: None,
        }
    }
}
