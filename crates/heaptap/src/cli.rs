//! Command line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Incremental extractor for Heap Parquet exports")]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the catalog of every table in the export
    Discover,
    /// Extract the selected streams of a catalog to stdout
    Sync {
        /// Catalog produced by `discover`, with streams selected
        #[arg(long, alias = "properties")]
        catalog: PathBuf,
    },
}
