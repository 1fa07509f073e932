use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mp4forge")]
#[command(author, version, about = "Automated media transcoding tool")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more files
    Convert {
        /// Input files to process
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Show the planned decisions and command without executing
        #[arg(long)]
        dry_run: bool,

        /// Force a full re-encode of every stream
        #[arg(long)]
        force: bool,

        /// Concurrent conversions (defaults to config, then CPU count)
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
