use crate::constants::DEFAULT_CONFIG_PATH;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "volcanoftpd", about = "A minimal active-mode FTP server.")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the control port from the configuration
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the server root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Enable verbose mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the recorded session stats and exit
    #[arg(long)]
    pub dump_stats: bool,
}
