//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Phased ingestion pipeline for remote legal catalogs.
///
/// Lexgraph discovers documents from configured category listings, fetches
/// and extracts their content, and materializes a cross-reference graph,
/// all into a single resumable SQLite store.
#[derive(Parser, Debug)]
#[command(name = "lexgraph")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the SQLite database file
    #[arg(long, default_value = "lexgraph.db")]
    pub db: PathBuf,

    /// Path to a JSON configuration file (defaults apply when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline phases to run.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discover documents from configured category listings
    Discover,
    /// Fetch and extract content for discovered documents
    Detail,
    /// Extract cross-reference edges from detailed documents
    Relations,
    /// Run all three phases in order
    Run,
}
