//! Command-line interface definition using clap
//!
//! The BBS host launches the door with the drop file path(s) as arguments;
//! everything else comes from `door-link.toml`.

use clap::Parser;
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Run a BBS door over the caller's telnet socket or serial line
#[derive(Parser, Debug, Default)]
#[command(name = "door-link")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file (default: door-link.toml next to the executable)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Let the caller stay past the drop file's time limit
    #[arg(long)]
    pub no_time_limit: bool,

    /// Drop files to try in order (overrides config)
    #[arg(value_name = "DROP_FILE")]
    pub drop_files: Vec<PathBuf>,
}

// =============================================================================
// Tests
// =============================================================================
