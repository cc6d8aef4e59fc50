//! # Ultrasearch CLI
//!
//! Offline inspection tool for the Ultrasearch search client. It never talks
//! to the daemon; it shows what the client would send.
//!
//! ## Commands
//!
//! - `ultrasearch parse <query>` - Translate a query into daemon syntax
//! - `ultrasearch classes` - Show the entity-type to class id mapping
//! - `ultrasearch plan` - Show the daemon request for a set of options
//! - `ultrasearch config` - Show the effective configuration
//!
//! ## Example Usage
//!
//! ```bash
//! # See how a query is translated
//! ultrasearch parse 'dog OR cat -"white tigers" title:animals'
//!
//! # Inspect the request for page 2 of sellers, faceted by state
//! ultrasearch plan --query seller --page 2 --class Seller --facet state_id
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ultrasearch - Search daemon client inspector
#[derive(Parser)]
#[command(name = "ultrasearch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a query into daemon syntax
    Parse {
        /// The query, as a user would type it
        query: String,
    },

    /// Show the entity-type to class id mapping
    Classes {
        /// Daemon configuration to read (defaults to the configured path)
        #[arg(long)]
        conf: Option<PathBuf>,
    },

    /// Show the daemon request a search would issue
    Plan(commands::plan::PlanArgs),

    /// Show the effective configuration
    Config {
        /// Only print the configuration file path
        #[arg(short, long)]
        path: bool,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Load configuration
    let config = match &cli.config {
        Some(path) => ultrasearch_core::Config::load_from(path)?,
        None => ultrasearch_core::Config::load()?,
    };

    // Execute command
    match cli.command {
        Commands::Parse { query } => commands::parse::run(config, &query),
        Commands::Classes { conf } => commands::classes::run(config, conf),
        Commands::Plan(args) => commands::plan::run(config, args),
        Commands::Config { path } => commands::config::run(config, cli.config, path),
    }
}
