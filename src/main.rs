use std::process;

use clap::Parser;
use obackup::commands::{self, Cli, Commands};
use obackup::sysexits;
use tracing_subscriber::EnvFilter;

/// Entry point for the obk CLI application.
/// Parses command-line arguments and dispatches to the appropriate command handler.
fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let Some(commands) = cli.commands else {
        eprintln!("obk requires at least one command to execute. See 'obk --help' for usage.");
        process::exit(sysexits::EX_KEYWORD);
    };

    let result = match commands {
        Commands::Run(args) => commands::run(args).map(|ok| {
            if !ok {
                process::exit(sysexits::EX_FAILURES);
            }
        }),
        Commands::Config { init, reset } => {
            if init {
                commands::init_config()
            } else if reset {
                commands::reset_config()
            } else {
                commands::config()
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(sysexits::EX_SOFTWARE);
    }
}

/// Logs go to stderr so the summary on stdout stays machine-readable.
fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "obackup=debug"
    } else if cli.quiet {
        "obackup=warn"
    } else {
        "obackup=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
