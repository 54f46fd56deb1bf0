//! Command-line interface definition for obackup.
//!
//! This module defines the CLI commands and their arguments, and the logic
//! that turns them into a backup run or a configuration change.

use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backup::{Backup, BackupOptions};
use crate::config::{self, Config};
use crate::error::BackupError;
use crate::notify::{self, WebhookNotifier};
use crate::store::LocalStore;
use crate::sysexits;

/// Command-line interface definition for obackup.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub commands: Option<Commands>,
    /// Show debug logs.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Supported obackup commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up the source directory into the object store.
    Run(RunArgs),
    /// Display the absolute path of the configuration file, or initialize/reset it.
    Config {
        /// Write a default configuration file if none exists.
        #[arg(short, long, conflicts_with = "reset")]
        init: bool,
        /// Overwrite the configuration file with defaults.
        #[arg(short, long, conflicts_with = "init")]
        reset: bool,
    },
}

/// Arguments of the `run` command. Unset values fall back to the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Directory to back up.
    #[arg(short, long)]
    pub source: Option<PathBuf>,
    /// Root directory of the object store.
    #[arg(short, long)]
    pub dest: Option<PathBuf>,
    /// Root prefix of every remote key.
    #[arg(short, long)]
    pub prefix: Option<String>,
    /// Store this run under a timestamped folder below the prefix.
    #[arg(short, long)]
    pub timestamped: bool,
    /// Skip files that already exist in the object store.
    #[arg(short = 'k', long)]
    pub skip_existing: bool,
    /// Maximum upload attempts per file.
    #[arg(short = 'r', long)]
    pub max_retries: Option<NonZeroU32>,
    /// Number of files uploaded at the same time.
    #[arg(short, long)]
    pub concurrency: Option<NonZeroUsize>,
    /// Do not deliver the report notification.
    #[arg(long)]
    pub no_notify: bool,
    /// Print the report as JSON instead of the text summary.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Layers the command-line flags over the configured options.
    pub fn apply(&self, mut options: BackupOptions) -> BackupOptions {
        if let Some(prefix) = &self.prefix {
            options.base_prefix = prefix.clone();
        }
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency.get();
        }
        options.timestamped |= self.timestamped;
        options.skip_existing |= self.skip_existing;
        options
    }
}

/// Runs one backup and delivers its report.
///
/// Returns `true` if every file was uploaded or skipped. Exits the process
/// with `EX_NOINPUT` if the source directory is unavailable and with
/// `EX_CONFIG` if the configuration is unusable.
pub fn run(args: RunArgs) -> Result<bool> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(sysexits::EX_CONFIG);
    });
    let Some(source) = args.source.clone().or_else(|| config.backup.source.clone()) else {
        eprintln!(
            "No source directory given. Use --source or set backup.source in the config file."
        );
        process::exit(sysexits::EX_CONFIG);
    };
    let Some(dest) = args.dest.clone().or_else(|| config.backup.destination.clone()) else {
        eprintln!("No destination given. Use --dest or set backup.destination in the config file.");
        process::exit(sysexits::EX_CONFIG);
    };
    let options = args.apply(config.backup.options());

    let rt = Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, remaining files will be reported as cancelled");
                interrupt.cancel();
            }
        });

        if !args.json {
            println!("Starting backup of '{}' into '{}'...", source.display(), dest.display());
        }
        let store = Arc::new(LocalStore::new(&dest));
        let backup = Backup::new(store, options).with_cancellation(cancel);
        let report = match backup.run(&source).await {
            Ok(report) => report,
            Err(e @ BackupError::SourceUnavailable { .. }) => {
                eprintln!("{e}");
                process::exit(sysexits::EX_NOINPUT);
            }
            Err(e) => return Err(e).context("Backup aborted"),
        };

        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!();
            println!("{report}");
        }

        if !args.no_notify {
            match config.notify.webhook_url() {
                Some(url) => {
                    notify::dispatch(&WebhookNotifier::new(url), &report).await;
                }
                None => {
                    eprintln!("No notification webhook configured. Skipping report notification.");
                    warn!("Report notification skipped: no webhook configured");
                }
            }
        }
        Ok(report.is_success())
    })
}

/// Prints the absolute path of the configuration file.
pub fn config() -> Result<()> {
    println!("config file: {}", config::config_file()?.display());
    Ok(())
}

/// Writes a default configuration file unless one exists.
pub fn init_config() -> Result<()> {
    let path = config::config_file()?;
    if config::init_config()? {
        println!("Configuration file created: {}", path.display());
    } else {
        println!("Configuration file already exists: {}", path.display());
    }
    Ok(())
}

/// Resets the configuration file to defaults.
pub fn reset_config() -> Result<()> {
    config::reset_config().context("Failed to reset configuration file")?;
    println!("Configuration file reset successfully!");
    Ok(())
}
