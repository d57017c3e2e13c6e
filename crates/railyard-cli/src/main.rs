//! railyard: operator entry point for the pipeline scheduling core.
//!
//! # Quick Start
//!
//! ```bash
//! # Validate a tenant layout
//! railyard validate ./layout.toml
//!
//! # Run the scheduler daemon against it (development mode)
//! railyard start ./layout.toml --development
//!
//! # List the end-to-end scenarios the test suite exercises
//! railyard sim list
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "railyard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Validate a tenant layout TOML file.
    Validate {
        /// Path to the layout file.
        path: String,
    },

    /// Run the scheduler daemon against a tenant layout.
    Start {
        /// Path to the layout file.
        path: String,

        /// Run against an in-memory coordination store and a scripted
        /// Gerrit client instead of a production connection.
        #[arg(long)]
        development: bool,
    },

    /// Scenario commands.
    #[command(subcommand)]
    Sim(SimCommands),
}

#[derive(Subcommand)]
enum SimCommands {
    /// List the end-to-end scenarios the test suite exercises.
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Validate { path } => commands::validate::run(&path),
        Commands::Start { path, development } => commands::start::run(&path, development),
        Commands::Sim(SimCommands::List) => {
            commands::sim::list();
            Ok(())
        }
    }
}
