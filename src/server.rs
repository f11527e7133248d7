use crate::config::Config;
use crate::core_ftpcommand::handlers::{initialize_command_handlers, validate_command_handlers};
use crate::core_network::network::{self, ServerState};
use crate::core_stats::StatsRecorder;
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::time::timeout;

/// Runs the FTP server with the provided configuration.
///
/// Builds the shared pieces (dispatch table, stats writer, server root),
/// serves until Ctrl-C, then waits for the stats writer to drain.
pub async fn run(config: Config) -> Result<()> {
    log_config(&config);

    let handlers = initialize_command_handlers();
    validate_command_handlers(&handlers)?;

    let base_path = config
        .server
        .root_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve root dir {}", config.server.root_dir.display()))?;

    let (stats, stats_task) = StatsRecorder::spawn(config.server.stats_file.clone())
        .await
        .context("Failed to start stats writer")?;

    let grace = config.server.shutdown_grace();
    let state = ServerState {
        config: Arc::new(config),
        handlers: Arc::new(handlers),
        stats,
        base_path,
    };

    let result = network::start_server(state, shutdown_signal()).await;
    if let Err(e) = &result {
        error!("Server failed: {:#}", e);
    }

    // The writer exits once the last session has dropped its handle.
    match timeout(grace, stats_task).await {
        Ok(Ok(Ok(written))) => info!("Stats log closed, {} session(s) recorded", written),
        Ok(Ok(Err(e))) => error!("Stats writer failed: {}", e),
        Ok(Err(e)) => error!("Stats writer task failed: {}", e),
        Err(_) => warn!("Stats writer still busy after {:?}, giving up", grace),
    }

    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Caught CTRL+C, exiting"),
        Err(e) => {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// Helper function to log configuration options
pub fn log_config(config: &Config) {
    let server = &config.server;
    info!("  Listen Address: {}:{}", server.bind_address, server.listen_port);
    info!("  Root Directory: {}", server.root_dir.display());
    info!("  Stats File: {}", server.stats_file.display());
    info!("  Data Host Policy: {:?}", server.data_host_policy);
    info!("  Idle Timeout: {}s", server.idle_timeout_secs);
    info!("  Data Connect Timeout: {}s", server.data_connect_timeout_secs);
    info!("  Upload Buffer Size: {} KB", server.upload_buffer_size / 1024);
    info!("  Download Buffer Size: {} KB", server.download_buffer_size / 1024);
}
