use crate::constants::SYSTEM_TYPE;
use crate::session::SessionContext;

/// Handles the SYST (System) FTP command.
pub async fn handle_syst_command(
    ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    ctx.reply(215, SYSTEM_TYPE).await
}
