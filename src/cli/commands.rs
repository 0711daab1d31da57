//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(about = "Beacon - seller agent node for the AURA protocol", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a beacon node
    Run {
        /// Path to a JSON config file
        #[arg(short = 'f', long)]
        config: Option<PathBuf>,

        /// AURA Core address to dial (overrides config)
        #[arg(short, long)]
        remote: Option<String>,

        /// Path to a JSON catalog file
        #[arg(short = 'c', long)]
        catalog: Option<PathBuf>,
    },

    /// Inspect a catalog file
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// Validate a catalog file and print a summary
    Check {
        /// Path to the catalog JSON file
        path: PathBuf,
    },

    /// List catalog items
    List {
        /// Path to the catalog JSON file
        path: PathBuf,
    },
}
