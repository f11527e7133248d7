pub mod logger;

pub use logger::SessionLog;
