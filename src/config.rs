use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the server connects back to once a client has sent `PORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataHostPolicy {
    /// The advertised host must be the control connection's peer.
    Peer,
    /// Any advertised host is accepted.
    Advertised,
    /// Always connect to 127.0.0.1, whatever the client advertised.
    Loopback,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub bind_address: String,
    pub root_dir: PathBuf,
    pub stats_file: PathBuf,
    pub log_level: String,
    pub idle_timeout_secs: u64,
    pub data_connect_timeout_secs: u64,
    pub accept_poll_interval_ms: u64,
    pub shutdown_grace_secs: u64,
    pub data_host_policy: DataHostPolicy,
    pub upload_buffer_size: usize,
    pub download_buffer_size: usize,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: 21,
            bind_address: String::from("0.0.0.0"),
            root_dir: PathBuf::from("/var/ftp"),
            stats_file: PathBuf::from("stat.jsonl"),
            log_level: String::from("info"),
            idle_timeout_secs: 300,
            data_connect_timeout_secs: 5,
            accept_poll_interval_ms: 1000,
            shutdown_grace_secs: 5,
            data_host_policy: DataHostPolicy::Peer,
            upload_buffer_size: 256 * 1024,  // Default 256 KB
            download_buffer_size: 128 * 1024, // Default 128 KB
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn data_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connect_timeout_secs)
    }

    pub fn accept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.accept_poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str)?;
        Ok(config)
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if !server.root_dir.is_dir() {
            bail!("'{}' is not a correct directory", server.root_dir.display());
        }
        if server.idle_timeout_secs == 0 {
            bail!("idle_timeout_secs must be greater than zero");
        }
        if server.data_connect_timeout_secs == 0 {
            bail!("data_connect_timeout_secs must be greater than zero");
        }
        if server.accept_poll_interval_ms == 0 {
            bail!("accept_poll_interval_ms must be greater than zero");
        }
        if server.upload_buffer_size == 0 || server.download_buffer_size == 0 {
            bail!("transfer buffer sizes must be greater than zero");
        }
        Ok(())
    }
}
