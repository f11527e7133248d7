use crate::config::Config;
use crate::constants::{MAX_COMMAND_LINE, SERVER_NAME};
use crate::core_error::SessionError;
use crate::core_ftpcommand::ftpcommand::{CommandLine, FtpCommand};
use crate::core_ftpcommand::handlers::CommandHandlers;
use crate::core_log::SessionLog;
use crate::core_stats::StatsHandle;
use crate::session::{Session, SessionContext};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Shared, read-only state handed to every session worker.
pub struct ServerState {
    pub config: Arc<Config>,
    pub handlers: Arc<CommandHandlers>,
    pub stats: StatsHandle,
    pub base_path: PathBuf,
}

/// Why a command loop stopped without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    ClientClosed,
    IdleTimeout,
    ServerShutdown,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            LoopExit::Quit => "client sent QUIT",
            LoopExit::ClientClosed => "client closed the control connection",
            LoopExit::IdleTimeout => "idle timeout",
            LoopExit::ServerShutdown => "server shutdown",
        };
        f.write_str(reason)
    }
}

pub async fn start_server<S>(state: ServerState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let server = &state.config.server;
    let addr = format!("{}:{}", server.bind_address, server.listen_port);
    if server.listen_port < 1024 {
        warn!(
            "Port {} is privileged, binding needs root or CAP_NET_BIND_SERVICE",
            server.listen_port
        );
    }

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control listener on {}", addr))?;
    info!("Server is listening on {}", listener.local_addr()?);

    serve(listener, state, shutdown).await
}

/// Accept loop with interleaved reaping.
///
/// Each connection runs in its own worker task. Between accepts the loop
/// wakes on a bounded tick to reclaim finished workers, so neither accepting
/// nor reaping can starve the other.
pub async fn serve<S>(listener: TcpListener, state: ServerState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let state = Arc::new(state);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut workers: JoinSet<()> = JoinSet::new();

    let mut tick = interval(state.config.server.accept_poll_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        info!("New connection from {}", peer);
                        workers.spawn(run_worker(
                            socket,
                            peer,
                            Arc::clone(&state),
                            shutdown_rx.clone(),
                            cancel_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning.
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
                reap_finished(&mut workers);
            }
            _ = tick.tick() => {
                reap_finished(&mut workers);
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
        }
    }

    drop(listener);
    let _ = shutdown_tx.send(true);

    // Idle sessions leave on the shutdown notice. Sessions busy in a
    // transfer are cancelled once the grace period is over, which still runs
    // their teardown. Only a worker stuck in teardown itself gets aborted.
    let grace = state.config.server.shutdown_grace();
    if !drain_workers(&mut workers, grace).await {
        warn!(
            "{} session(s) still running after {:?}, cancelling them",
            workers.len(),
            grace
        );
        let _ = cancel_tx.send(true);
        if !drain_workers(&mut workers, grace).await {
            warn!("{} session(s) stuck in teardown, aborting them", workers.len());
            workers.shutdown().await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Waits up to `limit` for every worker to finish. False on timeout.
async fn drain_workers(workers: &mut JoinSet<()>, limit: Duration) -> bool {
    timeout(limit, async {
        while let Some(res) = workers.join_next().await {
            log_worker_exit(res);
        }
    })
    .await
    .is_ok()
}

/// Non-blocking reclamation of finished workers.
pub fn reap_finished(workers: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(res) = workers.try_join_next() {
        log_worker_exit(res);
        reaped += 1;
    }
    if reaped > 0 {
        debug!(
            "Reaped {} session worker(s), {} still running",
            reaped,
            workers.len()
        );
    }
    reaped
}

fn log_worker_exit(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!("Session worker panicked outside its session boundary: {}", e);
        } else {
            debug!("Session worker cancelled: {}", e);
        }
    }
}

/// Aborts the command loop when the owning worker goes away.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Fault boundary for one connection.
///
/// The command loop runs in an inner task; whatever happens to it (clean
/// exit, error, panic or cancellation at shutdown) this worker still replies
/// and runs teardown.
async fn run_worker(
    socket: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    shutdown: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) {
    let (read_half, write_half) = socket.into_split();
    let session = Session::new(state.base_path.clone(), peer);
    let log = SessionLog::new(&session.id, peer);
    let ctx = SessionContext {
        writer: Arc::new(Mutex::new(write_half)),
        config: Arc::clone(&state.config),
        session: Arc::new(Mutex::new(session)),
        stats: state.stats.clone(),
        log,
    };

    let loop_ctx = ctx.clone();
    let handlers = Arc::clone(&state.handlers);
    let mut command_loop = AbortOnDrop(tokio::spawn(async move {
        handle_connection(loop_ctx, read_half, handlers, shutdown).await
    }));

    let outcome = tokio::select! {
        res = &mut command_loop.0 => res,
        _ = cancel.changed() => {
            ctx.log.warn("Cancelling session, shutdown grace period is over");
            command_loop.0.abort();
            (&mut command_loop.0).await
        }
    };

    let fault = match outcome {
        Ok(Ok(exit)) => {
            ctx.log.info(&format!("Session ended: {}", exit));
            None
        }
        Ok(Err(e)) => Some(e),
        Err(e) if e.is_panic() => Some(SessionError::Panicked(panic_message(e))),
        Err(_) => Some(SessionError::Cancelled),
    };

    if let Some(e) = fault {
        ctx.log.error(&format!("Encountered fault: {}", e));
        // The client may have stopped reading; don't let the reply hold up teardown.
        let limit = ctx.config.server.data_connect_timeout();
        match timeout(limit, ctx.send_line(&e.to_ftp_response())).await {
            Ok(Ok(())) => {}
            Ok(Err(send_err)) => ctx
                .log
                .debug(&format!("Could not deliver fault reply: {}", send_err)),
            Err(_) => ctx.log.debug("Fault reply timed out"),
        }
    }

    ctx.teardown().await;
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Reads one control line of at most `MAX_COMMAND_LINE` bytes into `buf`.
pub async fn read_command_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut limited = reader.take(MAX_COMMAND_LINE);
    limited.read_until(b'\n', buf).await
}

/// Runs the command loop for one session until QUIT, EOF, idle timeout or
/// server shutdown. Commands run strictly one after another.
pub async fn handle_connection(
    ctx: SessionContext,
    read_half: OwnedReadHalf,
    handlers: Arc<CommandHandlers>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<LoopExit, SessionError> {
    let peer = ctx.session.lock().await.peer;
    ctx.log.info(&format!("Instanciating connection from {}", peer));
    ctx.reply(220, &format!("Connected to {}", SERVER_NAME))
        .await?;

    let idle = ctx.config.server.idle_timeout();
    let mut reader = BufReader::new(read_half);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let read = tokio::select! {
            res = timeout(idle, read_command_line(&mut reader, &mut raw)) => res,
            _ = shutdown.changed() => {
                ctx.reply(421, "Server is shutting down").await?;
                return Ok(LoopExit::ServerShutdown);
            }
        };

        let n = match read {
            Ok(res) => res?,
            Err(_) => {
                ctx.reply(421, "Idle timeout, closing control connection")
                    .await?;
                return Ok(LoopExit::IdleTimeout);
            }
        };
        if n == 0 {
            ctx.log.warn("Client killed connection to server");
            return Ok(LoopExit::ClientClosed);
        }

        if !raw.ends_with(b"\n") && n as u64 >= MAX_COMMAND_LINE {
            ctx.log
                .warn(&format!("Command line longer than {} bytes", MAX_COMMAND_LINE));
            match timeout(idle, discard_rest_of_line(&mut reader)).await {
                Ok(res) => res?,
                Err(_) => {
                    ctx.reply(421, "Idle timeout, closing control connection")
                        .await?;
                    return Ok(LoopExit::IdleTimeout);
                }
            }
            ctx.reply(500, "Command line too long").await?;
            continue;
        }

        let text = String::from_utf8_lossy(&raw);
        if !text.ends_with("\r\n") {
            ctx.log
                .warn(&format!("[server<-client]: {:?} is not CRLF terminated", text));
        }
        let line = text.trim_end_matches(['\r', '\n']);
        ctx.log.client_line(line);

        let Some(command) = CommandLine::parse(line) else {
            ctx.reply(500, "Empty command").await?;
            continue;
        };
        let Some(cmd) = FtpCommand::from_str(&command.verb) else {
            ctx.reply(502, "Not yet implemented").await?;
            continue;
        };
        let Some(handler) = handlers.get(&cmd) else {
            ctx.reply(502, "Not yet implemented").await?;
            continue;
        };

        handler(ctx.clone(), command.args).await?;

        if cmd == FtpCommand::QUIT {
            return Ok(LoopExit::Quit);
        }
    }
}

async fn discard_rest_of_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let n = read_command_line(reader, &mut scratch).await?;
        if n == 0 || scratch.ends_with(b"\n") {
            return Ok(());
        }
    }
}
