//! canaryfetch library
//!
//! Signature-based file type identification: reads a file's leading bytes,
//! matches them against a catalog of magic numbers, looks inside RIFF and
//! ZIP envelopes to tell WebP from WAV and DOCX from XLSX, and checks the
//! result against the extension the file's name claims.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use canaryfetch::{Detector, FileSource, Reconciler, SignatureTable};
//!
//! let table = Arc::new(SignatureTable::builtin());
//! let detector = Detector::new(table);
//! let reconciler = Reconciler::default();
//!
//! let detection = detector.detect(&FileSource::new("uploads/photo.jpg"));
//! let verdict = reconciler.reconcile("photo.jpg", &detection);
//!
//! if verdict.mismatch {
//!     println!("{}", verdict.message);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod detect;
pub mod engine;
pub mod header;
pub mod reconcile;
pub mod report;
pub mod reputation;
pub mod signatures;

// Re-export commonly used types
pub use config::Config;
pub use detect::{DetectOptions, Detection, DetectionResult, Detector, UNKNOWN};
pub use engine::Engine;
pub use header::{read_header, ByteSource, FileSource, HeaderRead, MemorySource};
pub use reconcile::{claimed_extension, Reconciler, Verdict, VerdictStatus};
pub use reputation::{ReputationLookup, ReputationReport, VirusTotalClient};
pub use signatures::{MatchOrder, SignatureEntry, SignatureTable};
