// Error types for the session engine
use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// Faults that end a session at the session boundary.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("control connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("session worker panicked: {0}")]
    Panicked(String),

    #[error("session was cancelled during shutdown")]
    Cancelled,
}

impl SessionError {
    pub fn to_ftp_response(&self) -> String {
        match self {
            SessionError::Cancelled => "421 Server is shutting down".to_string(),
            _ => "421 Something unexpected happened".to_string(),
        }
    }
}

/// Failures of a single `LIST`/`RETR`/`STOR` data transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Need PORT command")]
    NoPort,

    #[error("{0}")]
    Sink(io::Error),

    #[error("{0}")]
    Connect(io::Error),

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("{0}")]
    Stream(io::Error),
}

impl TransferError {
    pub fn to_ftp_response(&self) -> String {
        match self {
            TransferError::NoPort | TransferError::Sink(_) => format!("451 {}", self),
            TransferError::Connect(_) | TransferError::ConnectTimeout(_) => {
                format!("425 {}", self)
            }
            TransferError::Stream(_) => format!("426 {}", self),
        }
    }
}

/// Malformed or refused `PORT` arguments.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PortError {
    #[error("Expected h1,h2,h3,h4,p1,p2 but got '{0}'")]
    Malformed(String),

    #[error("Invalid number '{0}' in PORT argument")]
    InvalidNumber(String),

    #[error("Port 0 is not a valid data port")]
    ZeroPort,

    #[error("Data host {advertised} does not match control connection {peer}")]
    HostMismatch { advertised: Ipv4Addr, peer: String },
}

impl PortError {
    pub fn to_ftp_response(&self) -> String {
        format!("500 {}", self)
    }
}
