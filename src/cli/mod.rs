//! CLI module - Command line interface definitions and handlers

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use walkdir::WalkDir;

use crate::config::Config;
use crate::engine::{load_table, Engine};
use crate::report::{self, Summary};

/// canaryfetch - find out what a file really is
///
/// Identifies files by their magic bytes and flags files whose extension
/// does not match their content.
#[derive(Parser, Debug)]
#[command(name = "canaryfetch")]
#[command(version)]
#[command(
    about = "Detect a file's real type from its signature and flag extension mismatches",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check files against the signature catalog
    Check(CheckArgs),

    /// List the signatures in the active catalog
    Signatures(SignaturesArgs),

    /// Manage the config file
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct CheckArgs {
    /// Files (or directories with --recursive) to check
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Name the file claims to have (single file only)
    #[arg(long, short)]
    pub name: Option<String>,

    /// Descend into directories
    #[arg(long, short)]
    pub recursive: bool,

    /// Look up mismatched files on VirusTotal
    #[arg(long)]
    pub virustotal: bool,

    /// Signature catalog to use instead of the configured one
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "human")]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct SignaturesArgs {
    /// Signature catalog to list instead of the configured one
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "human")]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Write a commented sample config if none exists
    Init,
    /// Print the effective config
    Show,
    /// Print the config file location
    Path,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human readable (default)
    Human,
    /// JSON output
    Json,
}

/// Resolve the config file location
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config_file.clone().unwrap_or_else(Config::default_path)
}

/// Expand the command line paths into the files to check. Directories are
/// only walked with `--recursive`; otherwise they are passed through and
/// come back as unreadable.
pub fn collect_paths(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if recursive && path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping entry: {}", e),
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files
}

/// `check` command. Returns the process exit code.
pub fn run_check(args: &CheckArgs, mut config: Config) -> Result<i32> {
    if args.name.is_some() && (args.paths.len() != 1 || args.recursive) {
        bail!("--name can only be used with a single file");
    }
    if let Some(catalog) = &args.catalog {
        config.signatures.catalog = Some(catalog.clone());
    }

    let mut engine = Engine::from_config(&config);
    if args.virustotal {
        engine = engine.with_reputation(Box::new(config.reputation.client()));
    }

    let files = collect_paths(&args.paths, args.recursive);
    let verdicts = match (&args.name, files.as_slice()) {
        (Some(name), [path]) => vec![engine.check_path(path, Some(name.as_str()))],
        _ => engine.check_paths(&files),
    };
    let summary = Summary::from_verdicts(&verdicts);

    match args.output {
        OutputFormat::Human => {
            println!();
            for verdict in &verdicts {
                print!("{}", report::format_verdict(verdict));
            }
            if verdicts.len() > 1 {
                print!("{}", report::format_summary(&summary));
            }
        }
        OutputFormat::Json => {
            if verdicts.len() == 1 {
                println!("{}", serde_json::to_string_pretty(&verdicts[0])?);
            } else {
                println!("{}", serde_json::to_string_pretty(&verdicts)?);
            }
        }
    }

    Ok(summary.exit_code())
}

/// `signatures` command
pub fn run_signatures(args: &SignaturesArgs, mut config: Config) -> Result<()> {
    if let Some(catalog) = &args.catalog {
        config.signatures.catalog = Some(catalog.clone());
    }
    let (table, catalog_report) = load_table(&config);

    match args.output {
        OutputFormat::Human => print!("{}", report::format_catalog(&table, &catalog_report)),
        OutputFormat::Json => {
            let entries: Vec<_> = table
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "pattern": crate::signatures::encode_pattern(&e.pattern),
                        "type_tag": e.type_tag,
                        "description": e.description,
                    })
                })
                .collect();
            let skipped: Vec<String> = catalog_report
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect();
            let out = serde_json::json!({
                "signatures": entries,
                "loaded": catalog_report.loaded,
                "overwritten": catalog_report.overwritten,
                "skipped": skipped,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

/// `config` command
pub fn run_config(action: &ConfigAction, path: &Path, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Init => {
            if Config::ensure_exists(path)? {
                println!("Wrote sample config to {}", path.display());
            } else {
                println!("Config already exists at {}", path.display());
            }
        }
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
