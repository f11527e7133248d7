use crate::core_ftpcommand::ftpcommand::FtpCommand;
use crate::core_ftpcommand::{cdup, cwd, list, noop, pwd, quit, retr, stor, syst, type_, user};
use crate::core_network::{pasv, port};
use crate::session::SessionContext;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type CommandFuture = Pin<Box<dyn Future<Output = Result<(), std::io::Error>> + Send>>;

pub type CommandHandler = Box<
    dyn Fn(
            SessionContext,
            Vec<String>, // Whitespace-separated arguments after the verb
        ) -> CommandFuture
        + Send
        + Sync,
>;

pub type CommandHandlers = HashMap<FtpCommand, Arc<CommandHandler>>;

/// Wraps an async handler fn into a table entry.
pub fn boxed<F, Fut>(handler: F) -> Arc<CommandHandler>
where
    F: Fn(SessionContext, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), std::io::Error>> + Send + 'static,
{
    Arc::new(Box::new(move |ctx: SessionContext, args: Vec<String>| -> CommandFuture {
        Box::pin(handler(ctx, args))
    }))
}

pub fn initialize_command_handlers() -> CommandHandlers {
    let mut handlers: CommandHandlers = HashMap::new();

    handlers.insert(FtpCommand::USER, boxed(user::handle_user_command));
    handlers.insert(FtpCommand::PWD, boxed(pwd::handle_pwd_command));
    handlers.insert(FtpCommand::CWD, boxed(cwd::handle_cwd_command));
    handlers.insert(FtpCommand::CDUP, boxed(cdup::handle_cdup_command));
    handlers.insert(FtpCommand::TYPE, boxed(type_::handle_type_command));
    handlers.insert(FtpCommand::PORT, boxed(port::handle_port_command));
    handlers.insert(FtpCommand::PASV, boxed(pasv::handle_pasv_command));
    handlers.insert(FtpCommand::LIST, boxed(list::handle_list_command));
    handlers.insert(FtpCommand::RETR, boxed(retr::handle_retr_command));
    handlers.insert(FtpCommand::STOR, boxed(stor::handle_stor_command));
    handlers.insert(FtpCommand::SYST, boxed(syst::handle_syst_command));
    handlers.insert(FtpCommand::NOOP, boxed(noop::handle_noop_command));
    handlers.insert(FtpCommand::QUIT, boxed(quit::handle_quit_command));

    handlers
}

/// Fails when a known verb has no handler, so nothing is misrouted at runtime.
pub fn validate_command_handlers(handlers: &CommandHandlers) -> Result<()> {
    let missing: Vec<String> = FtpCommand::ALL
        .iter()
        .filter(|cmd| !handlers.contains_key(*cmd))
        .map(|cmd| format!("{:?}", cmd))
        .collect();
    if !missing.is_empty() {
        bail!("No handler registered for: {}", missing.join(", "));
    }
    Ok(())
}
