use colored::Colorize;
use env_logger::{Builder, Env};
use log::{debug, error, info, warn, Level};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

pub const SESSION_TARGET: &str = "volcanoftpd::session";

/// Installs the process-wide logger. `RUST_LOG` wins over `default_level`.
pub fn init(default_level: &str) {
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                colorize_level(record.level()),
                record.args()
            )
        })
        .init();
}

fn colorize_level(level: Level) -> String {
    let label = level.to_string();
    match level {
        Level::Error => label.red().bold().to_string(),
        Level::Warn => label.yellow().to_string(),
        Level::Info => label.green().to_string(),
        Level::Debug => label.blue().to_string(),
        Level::Trace => label.dimmed().to_string(),
    }
}

/// Logging context owned by one session.
///
/// Every line carries the session id and the peer address so interleaved
/// output from concurrent sessions can be told apart.
#[derive(Debug, Clone)]
pub struct SessionLog {
    prefix: Arc<str>,
}

impl SessionLog {
    pub fn new(session_id: &str, peer: SocketAddr) -> Self {
        Self {
            prefix: Arc::from(format!("{} {}", session_id, peer)),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn info(&self, message: &str) {
        info!(target: SESSION_TARGET, "[{}] {}", self.prefix, message);
    }

    pub fn warn(&self, message: &str) {
        warn!(target: SESSION_TARGET, "[{}] {}", self.prefix, message);
    }

    pub fn debug(&self, message: &str) {
        debug!(target: SESSION_TARGET, "[{}] {}", self.prefix, message);
    }

    pub fn error(&self, message: &str) {
        error!(target: SESSION_TARGET, "[{}] {}", self.prefix, message);
    }

    pub fn client_line(&self, line: &str) {
        self.info(&format!("[server<-client]: {}", line));
    }

    pub fn server_line(&self, line: &str) {
        self.info(&format!("[server->client]: {}", line));
    }
}
