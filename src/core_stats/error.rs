use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Failed to open stats log {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Stats log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode stats record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Corrupt stats record on line {line}: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Stats writer is no longer running")]
    WriterGone,
}
