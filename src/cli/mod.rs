//! CLI module for extree
//!
//! Works on a file-backed tree under a data directory:
//! - load: bulk load a document from JSON-lines events on stdin
//! - check: consistency report
//! - export: XML on stdout
//! - quality, stats: shape statistics and store figures

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, TreeArgs};
pub use commands::{check, export, load, quality, run, run_command, stats};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_events, write_response};
