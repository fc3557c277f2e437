//! canaryfetch - identify files by their magic bytes
//!
//! Reads a bounded prefix of each file, matches it against the signature
//! catalog and reports whether the file's extension tells the truth.

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use canaryfetch::cli::{self, Cli, Commands};
use canaryfetch::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli::config_path(&cli);
    let (config, config_error) = match Config::load_if_exists(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let configured_level = config.general.level_filter();

    // Initialize logging; stderr keeps JSON on stdout clean
    let level = if cli.verbose {
        LevelFilter::INFO
    } else {
        configured_level.unwrap_or(LevelFilter::WARN)
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("canaryfetch={}", level).parse()?),
        )
        .init();

    if let Some(e) = config_error {
        tracing::warn!("{:#}; using defaults", e);
    }
    if configured_level.is_none() {
        tracing::warn!(
            log_level = %config.general.log_level,
            "Unrecognized log level in config, using warn"
        );
    }

    match cli.command {
        Commands::Check(args) => {
            let code = cli::run_check(&args, config)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Signatures(args) => {
            cli::run_signatures(&args, config)?;
        }
        Commands::Config(args) => {
            cli::run_config(&args.action, &config_path, &config)?;
        }
    }

    Ok(())
}
