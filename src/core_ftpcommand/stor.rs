use crate::core_ftpcommand::utils::required_path_arg;
use crate::core_network::data_channel::receive_data;
use crate::core_vfs::stays_inside;
use crate::session::SessionContext;
use tokio::fs::File;

/// Handles the STOR (Store File) FTP command.
///
/// The parent directory has to exist already and lie inside the server
/// root. An existing file at the target is overwritten.
pub async fn handle_stor_command(
    ctx: SessionContext,
    args: Vec<String>,
) -> Result<(), std::io::Error> {
    let Some(arg) = required_path_arg(&ctx, &args).await? else {
        return Ok(());
    };

    let (target, file_path, root) = {
        let session = ctx.session.lock().await;
        let target = session.resolve(&arg);
        let file_path = session.real_path(&target);
        (target, file_path, session.base_path.clone())
    };
    ctx.log.debug(&format!("STOR {} -> {:?}", target, file_path));

    let parent_exists = match file_path.parent() {
        Some(parent) => {
            let is_dir = tokio::fs::metadata(parent)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            is_dir && stays_inside(&root, parent).await
        }
        None => false,
    };
    if !parent_exists {
        return ctx.reply(451, "Dir not found").await;
    }

    // An existing entry, symlink or not, has to resolve inside the root too.
    if tokio::fs::symlink_metadata(&file_path).await.is_ok()
        && !stays_inside(&root, &file_path).await
    {
        ctx.log
            .warn(&format!("Refusing to store {} outside the server root", target));
        return ctx.reply(451, "Target is not valid").await;
    }

    ctx.log.info(&format!("Receiving file: {}", target));
    receive_data(&ctx, move || File::create(file_path)).await
}
