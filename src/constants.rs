// src/constants.rs

pub const SERVER_NAME: &str = "VolcanoFTP";
pub const SYSTEM_TYPE: &str = "UNIX Type: L8";

/// Longest control line accepted, terminator included.
pub const MAX_COMMAND_LINE: u64 = 4096;

pub const SESSION_ID_BYTES: usize = 10;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/volcanoftpd.conf";
