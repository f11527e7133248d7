use crate::session::SessionContext;

/// PASV is refused: the server only opens data connections in active mode.
pub async fn handle_pasv_command(
    ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    ctx.log.debug("PASV requested, only active mode is available");
    ctx.reply(502, "Not yet implemented").await
}
