//! Human-readable rendering of verdicts and catalogs

use colored::Colorize;

use crate::reconcile::{Verdict, VerdictStatus};
use crate::reputation::{ReputationReport, ScanStatus};
use crate::signatures::{encode_pattern, CatalogReport, SignatureTable};

/// Totals across a batch of verdicts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub unknown: usize,
    pub unreadable: usize,
}

impl Summary {
    pub fn from_verdicts(verdicts: &[Verdict]) -> Self {
        let mut summary = Summary {
            total: verdicts.len(),
            ..Default::default()
        };
        for verdict in verdicts {
            match verdict.status {
                VerdictStatus::Match | VerdictStatus::Variation => summary.matched += 1,
                VerdictStatus::Mismatch | VerdictStatus::MissingExtension => {
                    summary.mismatched += 1
                }
                VerdictStatus::Unknown => summary.unknown += 1,
                VerdictStatus::Unreadable => summary.unreadable += 1,
            }
        }
        summary
    }

    /// Process exit code: 2 if anything was unreadable, 1 on any mismatch
    pub fn exit_code(&self) -> i32 {
        if self.unreadable > 0 {
            2
        } else if self.mismatched > 0 {
            1
        } else {
            0
        }
    }
}

/// One verdict as a short block of text
pub fn format_verdict(verdict: &Verdict) -> String {
    let mut out = String::new();

    let tag = match verdict.status {
        VerdictStatus::Match | VerdictStatus::Variation => "OK".green().bold(),
        VerdictStatus::Mismatch | VerdictStatus::MissingExtension => "MISMATCH".red().bold(),
        VerdictStatus::Unknown => "UNKNOWN".yellow().bold(),
        VerdictStatus::Unreadable => "UNREADABLE".bright_red().bold(),
    };

    out.push_str(&format!("  [{}] {}\n", tag, verdict.filename.bright_white()));
    out.push_str(&format!("      Extension:  {}\n", verdict.extension));
    if let Some(detected) = &verdict.detected_type {
        out.push_str(&format!(
            "      Detected:   {} ({})\n",
            detected.bright_cyan(),
            verdict.detected_description
        ));
    }
    out.push_str(&format!("      {}\n", verdict.message));

    if let Some(report) = &verdict.reputation {
        out.push_str(&format_reputation(report));
    }

    out
}

fn format_reputation(report: &ReputationReport) -> String {
    match report {
        ReputationReport::Found {
            filehash,
            malicious,
            suspicious,
            undetected,
            harmless,
            date,
            permalink,
            status,
        } => {
            let status = match status {
                ScanStatus::Clean => "clean".green(),
                ScanStatus::Dirty => "dirty".red().bold(),
            };
            let mut out = format!("      VirusTotal: {} (sha256 {})\n", status, filehash);
            out.push_str(&format!(
                "        malicious {}  suspicious {}  undetected {}  harmless {}\n",
                malicious, suspicious, undetected, harmless
            ));
            if let Some(date) = date {
                out.push_str(&format!(
                    "        last analysis {}\n",
                    date.format("%Y-%m-%d %H:%M UTC")
                ));
            }
            out.push_str(&format!("        {}\n", permalink));
            out
        }
        ReputationReport::NotFound {
            filehash,
            message,
            link,
        } => format!("      VirusTotal: {} (sha256 {})\n        {}\n", message, filehash, link),
        ReputationReport::NotConfigured { message } => {
            format!("      VirusTotal: not configured. {}\n", message)
        }
        ReputationReport::Failed { details } => {
            format!("      VirusTotal: lookup failed: {}\n", details)
        }
    }
}

/// Footer line for a batch
pub fn format_summary(summary: &Summary) -> String {
    format!(
        "\n  {} checked, {} ok, {} mismatched, {} unknown, {} unreadable\n",
        summary.total,
        summary.matched.to_string().green(),
        summary.mismatched.to_string().red(),
        summary.unknown.to_string().yellow(),
        summary.unreadable
    )
}

/// Catalog listing for the `signatures` command
pub fn format_catalog(table: &SignatureTable, report: &CatalogReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\n  {} signatures ({} lines loaded, {} overwritten, {} skipped)\n\n",
        table.len(),
        report.loaded,
        report.overwritten,
        report.skipped()
    ));

    let width = table
        .entries()
        .iter()
        .map(|e| encode_pattern(&e.pattern).len())
        .max()
        .unwrap_or(0);

    for entry in table.iter() {
        out.push_str(&format!(
            "  {:<width$}  {:<8} {}\n",
            encode_pattern(&entry.pattern),
            entry.type_tag.bright_cyan(),
            entry.description,
            width = width
        ));
    }

    if !report.errors.is_empty() {
        out.push_str("\n  Skipped:\n");
        for error in &report.errors {
            out.push_str(&format!("    {}\n", error.to_string().yellow()));
        }
    }

    out
}
