//! Drive the filesystem metadata cache against the host filesystem.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, error};

mod app_config;
mod probe;
mod trc;

use crate::app_config::Config;
use crate::trc::Trc;

#[derive(Parser)]
#[command(
    version,
    about = "Probe and inspect the fscache filesystem metadata cache."
)]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to an fscache config TOML."
    )]
    config_path: Option<PathBuf>,

    #[arg(short, long, help = "Use the verbose log format.")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up paths through the cache and report what they resolved to.
    Probe {
        /// Paths to look up.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Look every path up this many times.
        #[arg(short, long)]
        repeat: Option<usize>,

        /// Number of concurrent workers.
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Report names that do not exist as errors.
        #[arg(long)]
        no_missing: bool,
    },

    /// List a directory through the cache.
    Ls {
        /// The directory to list.
        dir: String,
    },

    /// Print the effective configuration.
    Config,
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    // Errors use eprintln since tracing isn't initialized yet.
    let mut config = Config::load_or_default(args.config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    if let Command::Probe { repeat, jobs, .. } = &args.command {
        config.probe.repeat = repeat.unwrap_or(config.probe.repeat);
        config.probe.jobs = jobs.unwrap_or(config.probe.jobs);
    }
    if let Err(error_messages) = config.validate() {
        eprintln!("Configuration is invalid.");
        for msg in &error_messages {
            eprintln!(" - {msg}");
        }
        std::process::exit(1);
    }

    if let Err(e) = Trc::default().verbose(args.verbose).init() {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }
    debug!(config = ?config, "Starting with configuration.");

    match args.command {
        Command::Probe {
            paths, no_missing, ..
        } => match probe::run_probe(&config, paths, no_missing) {
            Ok((lines, stats)) => {
                for line in &lines {
                    println!("{}", line.render());
                }
                println!("{stats:#?}");
            }
            Err(e) => {
                error!("Probe failed: {e}");
                std::process::exit(1);
            }
        },
        Command::Ls { dir } => match probe::run_ls(&config, &dir) {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            Err(e) => {
                error!("Failed to list {dir}: {e}");
                std::process::exit(1);
            }
        },
        Command::Config => match config.to_toml() {
            Ok(text) => print!("{text}"),
            Err(e) => {
                error!("Failed to render configuration: {e}");
                std::process::exit(1);
            }
        },
    }
}
