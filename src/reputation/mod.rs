//! Reputation lookup - asks VirusTotal what it knows about a file
//!
//! The file is identified by the SHA-256 of its full content. Lookups are
//! only made for files whose extension contradicted their content, and
//! only when the caller asks for it. The result is informational: it is
//! attached to the verdict and never changes `mismatch` or `message`.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "VIRUSTOTAL_API_KEY";

/// VirusTotal v3 file report endpoint
pub const DEFAULT_ENDPOINT: &str = "https://www.virustotal.com/api/v3/files";

const GUI_FILE_URL: &str = "https://www.virustotal.com/gui/file";
const UPLOAD_URL: &str = "https://www.virustotal.com/gui/home/upload";

/// Overall reputation of a known file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No engine flagged the file as malicious
    Clean,
    Dirty,
}

/// Outcome of a reputation lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReputationReport {
    Found {
        filehash: String,
        malicious: u64,
        suspicious: u64,
        undetected: u64,
        harmless: u64,
        date: Option<DateTime<Utc>>,
        permalink: String,
        status: ScanStatus,
    },
    NotFound {
        filehash: String,
        message: String,
        link: String,
    },
    NotConfigured {
        message: String,
    },
    Failed {
        details: String,
    },
}

impl ReputationReport {
    pub fn is_dirty(&self) -> bool {
        matches!(
            self,
            ReputationReport::Found {
                status: ScanStatus::Dirty,
                ..
            }
        )
    }
}

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("failed to hash file: {0}")]
    Io(#[from] io::Error),

    #[error("request failed: {0}")]
    Http(String),

    #[error("unexpected response: {0}")]
    Malformed(&'static str),
}

/// Anything that can produce a reputation report for a stored file
pub trait ReputationLookup: Send + Sync {
    fn lookup(&self, path: &Path) -> ReputationReport;
}

/// SHA-256 of the full file, lowercase hex
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// VirusTotal v3 client over blocking HTTP
#[derive(Debug, Clone)]
pub struct VirusTotalClient {
    api_key: Option<String>,
    endpoint: String,
    timeout: Duration,
}

impl VirusTotalClient {
    pub fn new(api_key: Option<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Use `api_key` if given, otherwise `VIRUSTOTAL_API_KEY`
    pub fn from_env_or(
        api_key: Option<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok());
        Self::new(api_key, endpoint, timeout)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn fetch(&self, api_key: &str, filehash: &str) -> Result<ReputationReport, ReputationError> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), filehash);
        tracing::debug!(%url, "Querying VirusTotal");

        match ureq::get(&url)
            .timeout(self.timeout)
            .set("x-apikey", api_key)
            .call()
        {
            Ok(response) => {
                let json: serde_json::Value = response
                    .into_json()
                    .map_err(|e| ReputationError::Http(e.to_string()))?;
                parse_file_report(filehash, &json)
            }
            Err(ureq::Error::Status(404, _)) => Ok(not_found(filehash)),
            Err(e) => Err(ReputationError::Http(e.to_string())),
        }
    }
}

impl ReputationLookup for VirusTotalClient {
    fn lookup(&self, path: &Path) -> ReputationReport {
        let Some(api_key) = self.api_key.as_deref() else {
            return ReputationReport::NotConfigured {
                message: format!(
                    "Set '{}' or reputation.api_key in the config file.",
                    API_KEY_ENV
                ),
            };
        };

        let result = sha256_file(path)
            .map_err(ReputationError::from)
            .and_then(|filehash| self.fetch(api_key, &filehash));

        match result {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Reputation lookup failed: {}", e);
                ReputationReport::Failed {
                    details: e.to_string(),
                }
            }
        }
    }
}

fn not_found(filehash: &str) -> ReputationReport {
    ReputationReport::NotFound {
        filehash: filehash.to_string(),
        message: "The file is not found in VirusTotal's database.".to_string(),
        link: UPLOAD_URL.to_string(),
    }
}

/// Turn a v3 `/files/{hash}` response body into a report
pub fn parse_file_report(
    filehash: &str,
    json: &serde_json::Value,
) -> Result<ReputationReport, ReputationError> {
    let attributes = &json["data"]["attributes"];
    let stats = attributes["last_analysis_stats"]
        .as_object()
        .ok_or(ReputationError::Malformed("missing last_analysis_stats"))?;
    let count = |key: &str| stats.get(key).and_then(|v| v.as_u64()).unwrap_or(0);

    let malicious = count("malicious");
    let date = attributes["last_analysis_date"]
        .as_i64()
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(ReputationReport::Found {
        filehash: filehash.to_string(),
        malicious,
        suspicious: count("suspicious"),
        undetected: count("undetected"),
        harmless: count("harmless"),
        date,
        permalink: format!("{}/{}", GUI_FILE_URL, filehash),
        status: if malicious == 0 {
            ScanStatus::Clean
        } else {
            ScanStatus::Dirty
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_report_dirty() {
        let json = serde_json::json!({
            "data": {
                "attributes": {
                    "last_analysis_date": 1700000000,
                    "last_analysis_stats": {
                        "malicious": 3,
                        "suspicious": 1,
                        "undetected": 60,
                        "harmless": 0
                    }
                }
            }
        });
        let report = parse_file_report("deadbeef", &json).unwrap();
        match &report {
            ReputationReport::Found {
                malicious,
                suspicious,
                undetected,
                permalink,
                date,
                status,
                ..
            } => {
                assert_eq!(*malicious, 3);
                assert_eq!(*suspicious, 1);
                assert_eq!(*undetected, 60);
                assert_eq!(permalink, "https://www.virustotal.com/gui/file/deadbeef");
                assert_eq!(date.unwrap().timestamp(), 1_700_000_000);
                assert_eq!(*status, ScanStatus::Dirty);
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(report.is_dirty());
    }

    #[test]
    fn test_parse_report_clean_with_missing_counts() {
        let json = serde_json::json!({
            "data": { "attributes": { "last_analysis_stats": { "harmless": 5 } } }
        });
        let report = parse_file_report("cafe", &json).unwrap();
        assert!(!report.is_dirty());
        assert!(matches!(
            report,
            ReputationReport::Found {
                harmless: 5,
                malicious: 0,
                date: None,
                status: ScanStatus::Clean,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_report_malformed() {
        let json = serde_json::json!({ "error": { "code": "NotFoundError" } });
        assert!(matches!(
            parse_file_report("x", &json),
            Err(ReputationError::Malformed(_))
        ));
    }

    #[test]
    fn test_not_configured() {
        let client = VirusTotalClient::new(None, DEFAULT_ENDPOINT, Duration::from_secs(1));
        assert!(!client.is_configured());
        assert!(matches!(
            client.lookup(Path::new("/nonexistent")),
            ReputationReport::NotConfigured { .. }
        ));

        let blank =
            VirusTotalClient::new(Some("  ".into()), DEFAULT_ENDPOINT, Duration::from_secs(1));
        assert!(!blank.is_configured());
    }

    #[test]
    fn test_unreadable_file_fails_before_network() {
        let client = VirusTotalClient::new(
            Some("key".into()),
            "http://127.0.0.1:9/unused",
            Duration::from_millis(50),
        );
        let report = client.lookup(Path::new("/nonexistent/upload.bin"));
        match report {
            ReputationReport::Failed { details } => assert!(details.contains("hash")),
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[test]
    fn test_report_json_tag() {
        let json = serde_json::to_value(not_found("abc")).unwrap();
        assert_eq!(json["outcome"], "not_found");
        assert_eq!(json["filehash"], "abc");
        assert_eq!(json["link"], UPLOAD_URL);
    }
}
