// Here's the list of the FTP commands implemented
pub mod cdup;
pub mod cwd;
pub mod list;
pub mod noop;
pub mod pwd;
pub mod quit;
pub mod retr;
pub mod stor;
pub mod syst;
pub mod type_;
pub mod user;

// Dispatch table and verb parsing
pub mod ftpcommand;
pub mod handlers;

// The utils and common functions are here
pub mod utils;
