mod config;
mod constants;
mod core_cli;
mod core_error;
mod core_ftpcommand;
mod core_log;
mod core_network;
mod core_stats;
mod core_vfs;
mod server;
mod session;

use crate::config::Config;
use crate::core_cli::Cli;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Load configuration from the TOML file, then apply CLI overrides
    let mut config = Config::load_from_file(&args.config)?;
    if let Some(port) = args.port {
        config.server.listen_port = port;
    }
    if let Some(root) = args.root {
        config.server.root_dir = root;
    }

    let level = if args.verbose {
        "debug"
    } else {
        config.server.log_level.as_str()
    };
    core_log::logger::init(level);
    info!("Loaded configuration from {}", args.config.display());

    if args.dump_stats {
        return dump_stats(&config);
    }

    config.validate()?;

    // Run the FTP server
    server::run(config).await
}

fn dump_stats(config: &Config) -> Result<()> {
    let path = &config.server.stats_file;
    let summaries = core_stats::read_summaries(path)
        .with_context(|| format!("Failed to read stats log {}", path.display()))?;

    for summary in &summaries {
        let total: u64 = summary.transfers.iter().sum();
        println!(
            "{} {} login={} logout={} duration={:.3}s files={} bytes={}",
            summary.id,
            summary.peer,
            summary.login_time.to_rfc3339(),
            summary.logout_time.to_rfc3339(),
            summary.duration,
            summary.file_count,
            total
        );
    }
    println!("{} session(s) recorded in {}", summaries.len(), path.display());
    Ok(())
}
