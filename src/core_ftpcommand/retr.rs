use crate::core_ftpcommand::utils::required_path_arg;
use crate::core_network::data_channel::transmit_data;
use crate::core_vfs::stays_inside;
use crate::session::SessionContext;
use tokio::fs::File;

/// Handles the RETR (Retrieve) FTP command.
///
/// The file must exist, be a regular file and resolve inside the server root
/// before any data connection is attempted; otherwise the client gets `451`.
pub async fn handle_retr_command(
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
    ctx.log.debug(&format!("RETR {} -> {:?}", target, file_path));

    let is_file = tokio::fs::metadata(&file_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file || !stays_inside(&root, &file_path).await {
        return ctx.reply(451, "File not found").await;
    }

    let file = match File::open(&file_path).await {
        Ok(f) => f,
        Err(e) => {
            ctx.log
                .error(&format!("Could not open {:?}: {}", file_path, e));
            return ctx.reply(451, &format!("Cannot open file: {}", e)).await;
        }
    };

    ctx.log.info(&format!("Sending file: {}", target));
    transmit_data(&ctx, file).await
}
