#[allow(clippy::upper_case_acronyms)]
#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub enum FtpCommand {
    USER,
    PWD,
    CWD,
    CDUP,
    TYPE,
    PORT,
    PASV,
    LIST,
    RETR,
    STOR,
    SYST,
    NOOP,
    QUIT,
}

impl FtpCommand {
    pub const ALL: [FtpCommand; 13] = [
        FtpCommand::USER,
        FtpCommand::PWD,
        FtpCommand::CWD,
        FtpCommand::CDUP,
        FtpCommand::TYPE,
        FtpCommand::PORT,
        FtpCommand::PASV,
        FtpCommand::LIST,
        FtpCommand::RETR,
        FtpCommand::STOR,
        FtpCommand::SYST,
        FtpCommand::NOOP,
        FtpCommand::QUIT,
    ];

    pub fn from_str(cmd: &str) -> Option<FtpCommand> {
        match cmd.to_ascii_uppercase().as_str() {
            "USER" => Some(FtpCommand::USER),
            "PWD" => Some(FtpCommand::PWD),
            "CWD" => Some(FtpCommand::CWD),
            "CDUP" => Some(FtpCommand::CDUP),
            "TYPE" => Some(FtpCommand::TYPE),
            "PORT" => Some(FtpCommand::PORT),
            "PASV" => Some(FtpCommand::PASV),
            "LIST" => Some(FtpCommand::LIST),
            "RETR" => Some(FtpCommand::RETR),
            "STOR" => Some(FtpCommand::STOR),
            "SYST" => Some(FtpCommand::SYST),
            "NOOP" => Some(FtpCommand::NOOP),
            "QUIT" => Some(FtpCommand::QUIT),
            _ => None,
        }
    }
}

/// One control line split into its verb and arguments.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub verb: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Splits on whitespace; `None` for a blank line.
    pub fn parse(line: &str) -> Option<CommandLine> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?.to_string();
        let args = parts.map(str::to_string).collect();
        Some(CommandLine { verb, args })
    }
}
