use crate::session::SessionContext;

pub async fn handle_noop_command(
    ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    ctx.reply(200, "OK").await
}
