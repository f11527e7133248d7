// src/core_ftpcommand/pwd.rs
use crate::session::SessionContext;

pub async fn handle_pwd_command(
    ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    let current_dir = ctx.session.lock().await.current_dir.clone();
    ctx.reply(257, &format!("\"{}\" is current directory", current_dir))
        .await
}
