use crate::config::Config;
use crate::constants::SESSION_ID_BYTES;
use crate::core_log::SessionLog;
use crate::core_stats::{SessionSummary, StatsHandle};
use crate::core_vfs;
use chrono::{DateTime, Local};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Binary,
}

impl TransferType {
    /// Wording used in the `150` reply.
    pub fn label(&self) -> &'static str {
        match self {
            TransferType::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub bytes: u64,
    pub direction: TransferDirection,
}

/// Endpoint a client advertised with `PORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPort {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl DataPort {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.host, self.port))
    }
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub peer: SocketAddr,
    pub login_time: DateTime<Local>,
    pub logout_time: Option<DateTime<Local>>,
    pub current_dir: String, // Virtual, always root-anchored
    pub base_path: PathBuf,  // Server root all virtual paths map under
    pub transfer_type: TransferType,
    pub pending_port: Option<DataPort>,
    pub transfers: Vec<TransferRecord>,
    pub state: SessionState,
}

impl Session {
    pub fn new(base_path: PathBuf, peer: SocketAddr) -> Self {
        Self {
            id: generate_session_id(),
            peer,
            login_time: Local::now(),
            logout_time: None,
            current_dir: String::from("/"),
            base_path,
            transfer_type: TransferType::Binary,
            pending_port: None,
            transfers: Vec::new(),
            state: SessionState::Active,
        }
    }

    /// Virtual path for a client argument, relative to the current directory.
    pub fn resolve(&self, arg: &str) -> String {
        core_vfs::resolve(&self.current_dir, arg)
    }

    /// Real path for an already-resolved virtual path.
    pub fn real_path(&self, virtual_path: &str) -> PathBuf {
        core_vfs::to_real(&self.base_path, virtual_path)
    }

    /// Removes the pending data port; each `PORT` serves one transfer.
    pub fn take_data_port(&mut self) -> Option<DataPort> {
        self.pending_port.take()
    }

    pub fn record_transfer(&mut self, bytes: u64, direction: TransferDirection) -> usize {
        self.transfers.push(TransferRecord { bytes, direction });
        self.transfers.len() - 1
    }

    pub fn begin_closing(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Closing;
        }
    }

    /// Stamps the logout time and builds the stats summary.
    ///
    /// Returns `None` when the session was already finalized.
    pub fn finalize(&mut self) -> Option<SessionSummary> {
        if self.state == SessionState::Closed {
            return None;
        }
        self.state = SessionState::Closed;

        let logout_time = Local::now();
        self.logout_time = Some(logout_time);
        let duration = (logout_time - self.login_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let total = |direction: TransferDirection| -> u64 {
            self.transfers
                .iter()
                .filter(|t| t.direction == direction)
                .map(|t| t.bytes)
                .sum()
        };

        Some(SessionSummary {
            id: self.id.clone(),
            peer: self.peer.to_string(),
            login_time: self.login_time,
            logout_time,
            duration,
            file_count: self.transfers.len(),
            transfers: self.transfers.iter().map(|t| t.bytes).collect(),
            bytes_sent: total(TransferDirection::Sent),
            bytes_received: total(TransferDirection::Received),
        })
    }
}

/// Opaque hex token naming one connection.
pub fn generate_session_id() -> String {
    let bytes: [u8; SESSION_ID_BYTES] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Everything a command handler needs, cloned into each handler call.
#[derive(Clone)]
pub struct SessionContext {
    pub writer: Arc<Mutex<OwnedWriteHalf>>,
    pub config: Arc<Config>,
    pub session: Arc<Mutex<Session>>,
    pub stats: StatsHandle,
    pub log: SessionLog,
}

impl SessionContext {
    /// Sends `<code> <message>\r\n` on the control connection and logs it.
    pub async fn reply(&self, code: u16, message: &str) -> Result<(), std::io::Error> {
        let line = format!("{} {}", code, message);
        self.send_line(&line).await
    }

    /// Sends a preformatted reply line such as the output of `to_ftp_response`.
    pub async fn send_line(&self, line: &str) -> Result<(), std::io::Error> {
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
            writer.flush().await?;
        }
        self.log.server_line(line);
        Ok(())
    }

    /// Final step on every exit path: records stats once, then closes the
    /// control connection.
    pub async fn teardown(&self) {
        let (summary, peer, requested) = {
            let mut session = self.session.lock().await;
            let requested = session.state == SessionState::Closing;
            session.begin_closing();
            (session.finalize(), session.peer, requested)
        };
        if requested {
            self.log.debug("Closing session at the client's request");
        } else {
            self.log.debug("Closing session without QUIT");
        }

        if let Some(summary) = summary {
            self.log.info(&format!(
                "Session lasted {:.3}s with {} transfer(s)",
                summary.duration, summary.file_count
            ));
            if let Err(e) = self.stats.record(summary) {
                self.log.error(&format!("Failed to record session stats: {}", e));
            }
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            self.log.debug(&format!("Control connection already closed: {}", e));
        }
        self.log.info(&format!("Killing connection from {}", peer));
    }
}
