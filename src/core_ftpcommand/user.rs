use crate::session::SessionContext;

/// Handles the USER FTP command.
///
/// Any user name is accepted and logged in as anonymous; there is no
/// password exchange.
pub async fn handle_user_command(
    ctx: SessionContext,
    args: Vec<String>,
) -> Result<(), std::io::Error> {
    let username = args.first().map(String::as_str).unwrap_or("anonymous");
    ctx.log
        .info(&format!("Received USER command with username: {}", username));
    ctx.reply(230, "You are now logged in as Anonymous").await
}
