use crate::session::{SessionContext, TransferType};

/// Handles the TYPE FTP command.
///
/// Only `TYPE I` is accepted; ASCII translation and the other
/// representations are refused with `504`.
pub async fn handle_type_command(
    ctx: SessionContext,
    args: Vec<String>,
) -> Result<(), std::io::Error> {
    let Some(primary_type) = args.first() else {
        return ctx.reply(501, "No argument").await;
    };

    if primary_type.eq_ignore_ascii_case("i") {
        ctx.session.lock().await.transfer_type = TransferType::Binary;
        ctx.reply(200, "Transfer type is set to 'Binary data'").await
    } else {
        ctx.reply(504, "Only binary data transfer type accepted")
            .await
    }
}
