//! Check engine - detection, reconciliation and the optional reputation
//! lookup behind one call
//!
//! The engine is what a caller (the CLI here, an upload handler elsewhere)
//! talks to. It is built once from a [`Config`] and is then shared
//! read-only; [`Engine::check_paths`] fans out over rayon workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::Config;
use crate::detect::Detector;
use crate::header::{ByteSource, FileSource};
use crate::reconcile::{Reconciler, Verdict};
use crate::reputation::ReputationLookup;
use crate::signatures::{CatalogReport, SignatureTable};

/// Load the signature table the config points at, or the built-in one
pub fn load_table(config: &Config) -> (SignatureTable, CatalogReport) {
    let (table, report) = match &config.signatures.catalog {
        Some(path) => SignatureTable::load_from_path_with_report(path),
        None => {
            let (table, report) =
                SignatureTable::parse_with_report(crate::signatures::BUILTIN_CATALOG);
            tracing::debug!(signatures = table.len(), "Using built-in signature catalog");
            (table, report)
        }
    };
    (table.with_match_order(config.signatures.match_order), report)
}

/// Detector + reconciler, plus a reputation client used on mismatches
pub struct Engine {
    detector: Detector,
    reconciler: Reconciler,
    reputation: Option<Box<dyn ReputationLookup>>,
}

impl Engine {
    pub fn new(detector: Detector, reconciler: Reconciler) -> Self {
        Self {
            detector,
            reconciler,
            reputation: None,
        }
    }

    /// Build the engine from a config, loading the signature table once
    pub fn from_config(config: &Config) -> Self {
        let (table, _) = load_table(config);
        Self::from_config_with_table(config, Arc::new(table))
    }

    pub fn from_config_with_table(config: &Config, table: Arc<SignatureTable>) -> Self {
        let detector = Detector::with_options(table, config.detect);
        let mut reconciler = Reconciler::default();
        reconciler.add_synonyms(config.synonym_pairs());
        Self::new(detector, reconciler)
    }

    /// Look up reputation for files flagged as mismatched
    pub fn with_reputation(mut self, lookup: Box<dyn ReputationLookup>) -> Self {
        self.reputation = Some(lookup);
        self
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Detect and reconcile content from any source
    pub fn check(&self, source: &dyn ByteSource, filename: &str) -> Verdict {
        let detection = self.detector.detect(source);
        self.reconciler.reconcile(filename, &detection)
    }

    /// Check a stored file. `filename` is the name the file claims to have
    /// (defaults to the path's final component). The reputation lookup runs
    /// only on a mismatch and only when one was configured.
    pub fn check_path(&self, path: &Path, filename: Option<&str>) -> Verdict {
        let declared = filename
            .map(str::to_string)
            .unwrap_or_else(|| display_name(path));
        let verdict = self.check(&FileSource::new(path), &declared);

        match &self.reputation {
            Some(lookup) if verdict.mismatch => {
                let report = lookup.lookup(path);
                verdict.with_reputation(report)
            }
            _ => verdict,
        }
    }

    /// Check many files in parallel; results keep the input order
    pub fn check_paths(&self, paths: &[PathBuf]) -> Vec<Verdict> {
        paths
            .par_iter()
            .map(|path| self.check_path(path, None))
            .collect()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::VerdictStatus;
    use crate::reputation::ReputationReport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingLookup(Arc<AtomicUsize>);

    impl ReputationLookup for CountingLookup {
        fn lookup(&self, _path: &Path) -> ReputationReport {
            self.0.fetch_add(1, Ordering::SeqCst);
            ReputationReport::NotConfigured {
                message: "test".into(),
            }
        }
    }

    #[test]
    fn test_check_path_uses_file_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();

        let engine = Engine::from_config(&Config::default());
        let verdict = engine.check_path(&path, None);
        assert_eq!(verdict.filename, "report.pdf");
        assert_eq!(verdict.status, VerdictStatus::Match);
    }

    #[test]
    fn test_declared_name_overrides_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload-0001");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();

        let engine = Engine::from_config(&Config::default());
        let verdict = engine.check_path(&path, Some("invoice.docx"));
        assert_eq!(verdict.filename, "invoice.docx");
        assert!(verdict.mismatch);
    }

    #[test]
    fn test_reputation_only_on_mismatch() {
        let dir = TempDir::new().unwrap();
        let ok = dir.path().join("fine.pdf");
        let bad = dir.path().join("fake.jpg");
        std::fs::write(&ok, b"%PDF-1.4\n").unwrap();
        std::fs::write(&bad, b"%PDF-1.4\n").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = Engine::from_config(&Config::default())
            .with_reputation(Box::new(CountingLookup(calls.clone())));

        let verdict = engine.check_path(&ok, None);
        assert!(verdict.reputation.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let verdict = engine.check_path(&bad, None);
        assert!(verdict.mismatch);
        assert!(verdict.reputation.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // lookup never rewrites the verdict
        assert_eq!(verdict.status, VerdictStatus::Mismatch);
    }

    #[test]
    fn test_check_paths_keeps_order() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..16 {
            let path = dir.path().join(format!("f{}.pdf", i));
            std::fs::write(&path, b"%PDF").unwrap();
            paths.push(path);
        }
        paths.push(dir.path().join("missing.pdf"));

        let engine = Engine::from_config(&Config::default());
        let verdicts = engine.check_paths(&paths);
        assert_eq!(verdicts.len(), 17);
        assert_eq!(verdicts[3].filename, "f3.pdf");
        assert!(verdicts[16].is_unreadable());
    }

    #[test]
    fn test_custom_catalog_and_synonyms_from_config() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("signatures");
        std::fs::write(&catalog, "\\x00\\x00\\x01\\xba | MPEG | MPEG Program Stream\n").unwrap();
        let clip = dir.path().join("clip.mpg");
        std::fs::write(&clip, b"\x00\x00\x01\xba\x44\x00").unwrap();

        let mut config = Config::default();
        config.signatures.catalog = Some(catalog);
        config.reconcile.extra_synonyms.push(["MPG".into(), "MPEG".into()]);

        let engine = Engine::from_config(&config);
        assert_eq!(engine.detector().table().len(), 1);
        let verdict = engine.check_path(&clip, None);
        assert_eq!(verdict.status, VerdictStatus::Variation);
    }
}
