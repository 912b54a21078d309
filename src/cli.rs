use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a single video file
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Translate every pending file in the library
    Batch,

    /// Scan a directory tree into the library
    Scan {
        /// Directory containing video files
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Probe GPUs and show the recommended workload placement
    Gpus,

    /// Show the current batch status
    Status {
        /// Keep refreshing until the batch finishes
        #[arg(short, long)]
        watch: bool,
    },
}
