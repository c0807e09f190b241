//! Command line interface.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Move Steam Workshop downloads into a DayZ server, copy their keys and
/// rewrite the mod manifest.
#[derive(Debug, Parser)]
#[command(version, max_term_width = 100)]
pub struct Cli {
    /// Accepted for compatibility with existing launch scripts, otherwise unused
    #[arg(value_name = "PARAM")]
    pub param: Option<String>,

    /// Directory the server layout is resolved from [default: executable directory]
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Server root, absolute or relative to the base directory [default: dayz/223350]
    #[arg(long, value_name = "DIR")]
    pub server_dir: Option<PathBuf>,

    /// Never query the Steam Workshop for mod names
    #[arg(long)]
    pub offline: bool,

    /// Verbosity level (can be set multiple times)
    #[arg(long, short, action = ArgAction::Count)]
    pub verbose: u8,
}
