//! CLI argument definitions using clap
//!
//! Commands:
//! - extree load --data-dir <dir> [--config <path>]   (events on stdin)
//! - extree check --data-dir <dir> [--config <path>]
//! - extree export --data-dir <dir> [--physical] [--config <path>]
//! - extree quality --data-dir <dir> [--config <path>]
//! - extree stats --data-dir <dir> [--config <path>]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// extree - page-oriented storage for hierarchical documents
#[derive(Parser, Debug)]
#[command(name = "extree")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    /// Directory holding pages.dat and manifest.json
    #[arg(long)]
    pub data_dir: PathBuf,

    /// Path to configuration file; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bulk load a document from JSON-lines events on stdin
    Load {
        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Verify the structural invariants of a stored tree
    Check {
        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Write the document as XML to stdout
    Export {
        #[command(flatten)]
        tree: TreeArgs,

        /// Show record boundaries and ids
        #[arg(long)]
        physical: bool,
    },

    /// Report tree-shape statistics
    Quality {
        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Report manifest and page file figures
    Stats {
        #[command(flatten)]
        tree: TreeArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
