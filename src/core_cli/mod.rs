#[allow(clippy::module_inception)]
mod core_cli;

pub use self::core_cli::Cli;
