use crate::core_ftpcommand::utils::required_path_arg;
use crate::core_vfs::stays_inside;
use crate::session::SessionContext;

pub async fn handle_cwd_command(
    ctx: SessionContext,
    args: Vec<String>,
) -> Result<(), std::io::Error> {
    let Some(arg) = required_path_arg(&ctx, &args).await? else {
        return Ok(());
    };
    change_directory(&ctx, &arg).await
}

/// Moves the session to `arg` if it resolves to a real directory.
pub async fn change_directory(ctx: &SessionContext, arg: &str) -> Result<(), std::io::Error> {
    let (target, dir_path, root) = {
        let session = ctx.session.lock().await;
        let target = session.resolve(arg);
        let dir_path = session.real_path(&target);
        (target, dir_path, session.base_path.clone())
    };
    ctx.log.debug(&format!("CWD target {} -> {:?}", target, dir_path));

    let is_dir = tokio::fs::metadata(&dir_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir && stays_inside(&root, &dir_path).await {
        ctx.session.lock().await.current_dir = target.clone();
        ctx.log.debug(&format!("New cwd: {}", target));
        ctx.reply(250, &format!("CWD set to {}", target)).await
    } else {
        ctx.reply(500, "Target is not valid").await
    }
}
