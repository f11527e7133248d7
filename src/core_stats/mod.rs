pub mod error;
pub mod recorder;

pub use error::StatsError;
pub use recorder::{read_summaries, SessionSummary, StatsHandle, StatsRecorder};
