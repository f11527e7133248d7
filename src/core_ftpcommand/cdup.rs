use crate::core_ftpcommand::cwd::change_directory;
use crate::session::SessionContext;

/// CDUP is `CWD ..`; at the root it stays on `/`.
pub async fn handle_cdup_command(
    ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    change_directory(&ctx, "..").await
}
