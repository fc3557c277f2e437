//! Configuration Module - User preferences from ~/.canaryfetch/config.toml
//!
//! Supports:
//! - Signature catalog location and tie-break order
//! - Read sizes used during detection
//! - Extra extension synonyms
//! - VirusTotal credentials and timeout

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::detect::DetectOptions;
use crate::reputation::{VirusTotalClient, DEFAULT_ENDPOINT};
use crate::signatures::MatchOrder;

/// canaryfetch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Signature catalog settings
    pub signatures: SignaturesConfig,
    /// Detection read sizes
    pub detect: DetectOptions,
    /// Extension reconciliation
    pub reconcile: ReconcileConfig,
    /// Reputation lookup
    pub reputation: ReputationConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl GeneralConfig {
    /// Parsed `log_level`, or `None` when it is not a level name
    pub fn level_filter(&self) -> Option<LevelFilter> {
        self.log_level.trim().parse().ok()
    }
}

/// Signature catalog settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignaturesConfig {
    /// Catalog file (None = built-in catalog)
    pub catalog: Option<PathBuf>,
    /// Tie-break between overlapping patterns
    pub match_order: MatchOrder,
}

/// Extension reconciliation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Synonym pairs added to JPG/JPEG, HTM/HTML, TIF/TIFF
    pub extra_synonyms: Vec<[String; 2]>,
}

/// VirusTotal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    /// API key (falls back to VIRUSTOTAL_API_KEY)
    pub api_key: Option<String>,
    /// Files endpoint
    pub endpoint: String,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ReputationConfig {
    pub fn client(&self) -> VirusTotalClient {
        VirusTotalClient::from_env_or(
            self.api_key.clone(),
            self.endpoint.clone(),
            Duration::from_secs(self.timeout_secs),
        )
    }
}

impl Config {
    /// Load config from `path`; a missing file gives defaults
    pub fn load_if_exists(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "canaryfetch", "canaryfetch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".canaryfetch")
                    .join("config.toml")
            })
    }

    /// Write the commented sample config if nothing exists at `path`.
    /// Returns true when a file was written.
    pub fn ensure_exists(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, generate_sample_config())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        tracing::info!("Created default config at {}", path.display());
        Ok(true)
    }

    /// Synonym pairs from the config, ready for the reconciler
    pub fn synonym_pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.reconcile
            .extra_synonyms
            .iter()
            .map(|[a, b]| (a.as_str(), b.as_str()))
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# canaryfetch configuration
# Location: ~/.config/canaryfetch/config.toml (or %APPDATA%\canaryfetch\config.toml on Windows)

[general]
# Log level: trace, debug, info, warn, error
log_level = "warn"

[signatures]
# Signature catalog (pattern | type | description per line).
# Leave unset to use the built-in catalog.
# catalog = "/etc/canaryfetch/signatures"

# Tie-break between overlapping patterns:
#   "catalog"       - first matching line in the catalog wins
#   "longest_first" - the longest matching pattern wins
match_order = "catalog"

[detect]
# Bytes read for the signature match
header_size = 32

# Bytes scanned for Office package markers inside ZIP files
container_window = 2048

# Bytes checked when deciding whether an unmatched file is text
text_sample = 1024

[reconcile]
# Extension pairs treated as the same type, on top of JPG/JPEG, HTM/HTML, TIF/TIFF
extra_synonyms = [
    # ["MPG", "MPEG"],
]

[reputation]
# VirusTotal API key (falls back to the VIRUSTOTAL_API_KEY environment variable)
# api_key = ""

endpoint = "https://www.virustotal.com/api/v3/files"

# HTTP timeout in seconds
timeout_secs = 30
"#
    .to_string()
}
