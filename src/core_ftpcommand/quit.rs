use crate::constants::SERVER_NAME;
use crate::session::SessionContext;

/// Handles the QUIT FTP command.
///
/// Only sends the farewell; the command loop stops reading after QUIT and
/// the session boundary runs teardown.
pub async fn handle_quit_command(
    ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    ctx.log.info("Received QUIT command. Closing connection.");
    ctx.session.lock().await.begin_closing();
    ctx.reply(221, &format!("Thank you for using {}", SERVER_NAME))
        .await
}
