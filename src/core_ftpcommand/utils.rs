use crate::session::SessionContext;

/// Rebuilds a path argument that the line splitter broke on spaces.
///
/// Replies `501` and yields `None` when the client sent no argument.
pub async fn required_path_arg(
    ctx: &SessionContext,
    args: &[String],
) -> Result<Option<String>, std::io::Error> {
    if args.is_empty() {
        ctx.reply(501, "No argument").await?;
        return Ok(None);
    }
    Ok(Some(args.join(" ")))
}
