// Persisted per-session transfer statistics

use crate::core_stats::error::StatsError;
use chrono::{DateTime, Local};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One finalized session, as stored in the stats log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub peer: String,
    pub login_time: DateTime<Local>,
    pub logout_time: DateTime<Local>,
    /// Seconds between login and logout.
    pub duration: f64,
    pub file_count: usize,
    /// Byte count of every transfer, in the order they finished.
    pub transfers: Vec<u64>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Cheap handle sessions use to hand their summary to the writer.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    tx: mpsc::UnboundedSender<SessionSummary>,
}

impl StatsHandle {
    /// Queues a summary for the writer task.
    ///
    /// Never blocks, so it is safe to call from any teardown path.
    pub fn record(&self, summary: SessionSummary) -> Result<(), StatsError> {
        self.tx.send(summary).map_err(|_| StatsError::WriterGone)
    }
}

/// Sole writer of the stats log.
///
/// Every session sends its summary over a channel and this task appends them
/// one at a time, so concurrent teardowns can't clobber each other's records.
pub struct StatsRecorder {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<SessionSummary>,
}

impl StatsRecorder {
    /// Starts the writer task. It exits once every [`StatsHandle`] is dropped
    /// and the queued summaries are written.
    pub async fn spawn(
        path: PathBuf,
    ) -> Result<(StatsHandle, JoinHandle<Result<usize, StatsError>>), StatsError> {
        // Fail at startup rather than on the first teardown.
        open_log(&path).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = StatsRecorder { path, rx };
        let task = tokio::spawn(recorder.run());
        Ok((StatsHandle { tx }, task))
    }

    async fn run(mut self) -> Result<usize, StatsError> {
        let mut file = open_log(&self.path).await?;
        let written = append_all(&mut self.rx, &mut file).await;

        file.sync_all().await?;
        info!(
            "Stats writer stopped after {} records ({})",
            written,
            self.path.display()
        );
        Ok(written)
    }
}

/// Appends every queued summary until all senders are gone.
///
/// A record that fails to encode or reach the log is reported and skipped;
/// the writer keeps serving later sessions.
async fn append_all<W>(rx: &mut mpsc::UnboundedReceiver<SessionSummary>, out: &mut W) -> usize
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(summary) = rx.recv().await {
        match append(out, &summary).await {
            Ok(()) => {
                written += 1;
                debug!("Recorded stats for session {}", summary.id);
            }
            Err(e) => error!("Failed to append stats for session {}: {}", summary.id, e),
        }
    }
    written
}

async fn append<W>(out: &mut W, summary: &SessionSummary) -> Result<(), StatsError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(summary)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn open_log(path: &Path) -> Result<tokio::fs::File, StatsError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| StatsError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Loads every summary from a stats log. A missing file is an empty log.
pub fn read_summaries(path: &Path) -> Result<Vec<SessionSummary>, StatsError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| StatsError::Corrupt {
                line: idx + 1,
                source,
            })
        })
        .collect()
}
