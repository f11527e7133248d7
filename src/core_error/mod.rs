pub mod error;

pub use error::{PortError, SessionError, TransferError};
