// End-to-end tests: a real server on loopback driven by a minimal client

use crate::config::{Config, DataHostPolicy};
use crate::core_ftpcommand::ftpcommand::FtpCommand;
use crate::core_ftpcommand::handlers::{boxed, initialize_command_handlers, CommandHandlers};
use crate::core_network::network::{serve, ServerState};
use crate::core_stats::{read_summaries, SessionSummary, StatsError, StatsRecorder};
use crate::session::SessionContext;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

struct Harness {
    addr: SocketAddr,
    root: TempDir,
    _scratch: TempDir,
    stats_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<anyhow::Result<()>>,
    stats_task: JoinHandle<Result<usize, StatsError>>,
}

impl Harness {
    async fn start() -> Harness {
        Self::start_with(|_| {}).await
    }

    async fn start_with(tweak: impl FnOnce(&mut Config)) -> Harness {
        Self::start_with_handlers(tweak, initialize_command_handlers()).await
    }

    async fn start_with_handlers(
        tweak: impl FnOnce(&mut Config),
        handlers: CommandHandlers,
    ) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let stats_path = scratch.path().join("stat.jsonl");

        let mut config = Config::default();
        config.server.root_dir = root.path().to_path_buf();
        config.server.stats_file = stats_path.clone();
        config.server.accept_poll_interval_ms = 50;
        config.server.idle_timeout_secs = 30;
        config.server.data_connect_timeout_secs = 2;
        config.server.shutdown_grace_secs = 2;
        config.server.upload_buffer_size = 1024;
        config.server.download_buffer_size = 1024;
        tweak(&mut config);

        let (stats, stats_task) = StatsRecorder::spawn(stats_path.clone()).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = ServerState {
            base_path: root.path().canonicalize().unwrap(),
            config: Arc::new(config),
            handlers: Arc::new(handlers),
            stats,
        };
        let (shutdown, signal) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async move {
            let _ = signal.await;
        }));

        Harness {
            addr,
            root,
            _scratch: scratch,
            stats_path,
            shutdown: Some(shutdown),
            server,
            stats_task,
        }
    }

    fn write_file(&self, name: &str, content: &[u8]) {
        std::fs::write(self.root.path().join(name), content).unwrap();
    }

    /// Stops the server and returns everything the stats log holds.
    async fn stop(mut self) -> Vec<SessionSummary> {
        self.begin_shutdown();
        self.finish().await
    }

    fn begin_shutdown(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Waits for the server and the stats writer after shutdown was sent.
    async fn finish(self) -> Vec<SessionSummary> {
        timeout(STEP, self.server).await.unwrap().unwrap().unwrap();
        timeout(STEP, self.stats_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        read_summaries(&self.stats_path).unwrap()
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = Client {
            reader: BufReader::new(read_half),
            writer,
        };
        assert_eq!(client.reply().await, "220 Connected to VolcanoFTP");
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn reply(&mut self) -> String {
        let mut line = String::new();
        timeout(STEP, self.reader.read_line(&mut line))
            .await
            .expect("server did not reply in time")
            .unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    async fn cmd(&mut self, line: &str) -> String {
        self.send(line).await;
        self.reply().await
    }

    /// True once the server has closed the control connection.
    async fn closed(&mut self) -> bool {
        let mut rest = Vec::new();
        matches!(
            timeout(STEP, self.reader.read_to_end(&mut rest)).await,
            Ok(Ok(0))
        )
    }

    /// Opens a local data listener and announces it with PORT.
    async fn port(&mut self) -> TcpListener {
        let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = data.local_addr().unwrap().port();
        let reply = self
            .cmd(&format!("PORT 127,0,0,1,{},{}", port >> 8, port & 0xff))
            .await;
        assert_eq!(reply, format!("200 Port is set to {}", port));
        data
    }
}

fn download(data: TcpListener) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let (mut stream, _) = timeout(STEP, data.accept()).await.unwrap().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        received
    })
}

fn upload(data: TcpListener, payload: Vec<u8>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut stream, _) = timeout(STEP, data.accept()).await.unwrap().unwrap();
        stream.write_all(&payload).await.unwrap();
        stream.shutdown().await.unwrap();
    })
}

async fn no_connection_attempt(data: &TcpListener) -> bool {
    timeout(Duration::from_millis(200), data.accept())
        .await
        .is_err()
}

#[tokio::test]
async fn test_login_and_list_root() {
    let harness = Harness::start().await;
    harness.write_file("readme.txt", b"volcano");
    std::fs::create_dir(harness.root.path().join("pub")).unwrap();

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(
        client.cmd("USER anonymous").await,
        "230 You are now logged in as Anonymous"
    );
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory");
    assert_eq!(
        client.cmd("TYPE I").await,
        "200 Transfer type is set to 'Binary data'"
    );
    assert_eq!(
        client.cmd("PORT 127,0,0,1,200,5").await,
        "200 Port is set to 51205"
    );

    let data = client.port().await;
    let listing = download(data);
    assert_eq!(
        client.cmd("LIST").await,
        "150 Opening binary data connection"
    );
    assert_eq!(client.reply().await, "226 Done");

    let listing = String::from_utf8(listing.await.unwrap()).unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with('d') && lines[0].ends_with(" pub"));
    assert!(lines[1].starts_with('-') && lines[1].ends_with(" readme.txt"));

    assert!(client.cmd("QUIT").await.starts_with("221 "));
    assert!(client.closed().await);

    let summaries = harness.stop().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].transfers, vec![listing.len() as u64]);
}

#[tokio::test]
async fn test_list_accepts_ls_flags_and_paths() {
    let harness = Harness::start().await;
    std::fs::create_dir(harness.root.path().join("pub")).unwrap();
    std::fs::write(harness.root.path().join("pub").join("inner.bin"), b"x").unwrap();

    let mut client = Client::connect(harness.addr).await;
    let listing = download(client.port().await);
    assert!(client.cmd("LIST -la pub").await.starts_with("150 "));
    assert_eq!(client.reply().await, "226 Done");
    let listing = String::from_utf8(listing.await.unwrap()).unwrap();
    assert!(listing.trim_end().ends_with(" inner.bin"));

    assert_eq!(client.cmd("LIST missing").await, "500 Problem occured");
    harness.stop().await;
}

#[tokio::test]
async fn test_retr_sends_file_content() {
    let harness = Harness::start().await;
    let payload: Vec<u8> = (0..50_000u32).map(|n| (n % 253) as u8).collect();
    harness.write_file("blob.bin", &payload);

    let mut client = Client::connect(harness.addr).await;
    let received = download(client.port().await);
    assert!(client.cmd("RETR blob.bin").await.starts_with("150 "));
    assert_eq!(client.reply().await, "226 Done");
    assert_eq!(received.await.unwrap(), payload);

    // The port was consumed by the transfer.
    assert_eq!(client.cmd("RETR blob.bin").await, "451 Need PORT command");

    client.cmd("QUIT").await;
    let summaries = harness.stop().await;
    assert_eq!(summaries[0].transfers, vec![payload.len() as u64]);
    assert_eq!(summaries[0].bytes_sent, payload.len() as u64);
}

#[tokio::test]
async fn test_retr_missing_file_never_connects() {
    let harness = Harness::start().await;
    harness.write_file("present.txt", b"here");

    let mut client = Client::connect(harness.addr).await;
    let data = client.port().await;
    assert_eq!(client.cmd("RETR absent.txt").await, "451 File not found");
    assert!(no_connection_attempt(&data).await);

    // A directory is not a regular file either.
    assert_eq!(client.cmd("RETR /").await, "451 File not found");

    client.cmd("QUIT").await;
    let summaries = harness.stop().await;
    assert!(summaries[0].transfers.is_empty());
}

#[tokio::test]
async fn test_retr_without_port() {
    let harness = Harness::start().await;
    harness.write_file("present.txt", b"here");

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(client.cmd("RETR present.txt").await, "451 Need PORT command");
    assert_eq!(client.cmd("NOOP").await, "200 OK");
    harness.stop().await;
}

#[tokio::test]
async fn test_stor_writes_upload() {
    let harness = Harness::start().await;
    std::fs::create_dir(harness.root.path().join("incoming")).unwrap();
    let payload = b"uploaded through the data channel".repeat(100);

    let mut client = Client::connect(harness.addr).await;
    assert!(client.cmd("CWD incoming").await.starts_with("250 "));
    let sender = upload(client.port().await, payload.clone());
    assert!(client.cmd("STOR new file.bin").await.starts_with("150 "));
    assert_eq!(client.reply().await, "226 Done");
    sender.await.unwrap();

    let stored = std::fs::read(harness.root.path().join("incoming").join("new file.bin")).unwrap();
    assert_eq!(stored, payload);

    client.cmd("QUIT").await;
    let summaries = harness.stop().await;
    assert_eq!(summaries[0].bytes_received, payload.len() as u64);
}

#[tokio::test]
async fn test_stor_preconditions() {
    let harness = Harness::start().await;

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(client.cmd("STOR nodir/file.txt").await, "451 Dir not found");
    assert_eq!(client.cmd("STOR file.txt").await, "451 Need PORT command");
    assert!(!harness.root.path().join("file.txt").exists());
    harness.stop().await;
}

#[tokio::test]
async fn test_stor_cannot_escape_root() {
    let harness = Harness::start().await;
    let payload = b"trapped".to_vec();

    let mut client = Client::connect(harness.addr).await;
    let sender = upload(client.port().await, payload.clone());
    assert!(client
        .cmd("STOR ../../../escaped.txt")
        .await
        .starts_with("150 "));
    assert_eq!(client.reply().await, "226 Done");
    sender.await.unwrap();

    assert_eq!(
        std::fs::read(harness.root.path().join("escaped.txt")).unwrap(),
        payload
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_cwd_and_pwd_stay_inside_root() {
    let harness = Harness::start().await;
    std::fs::create_dir_all(harness.root.path().join("sub").join("deeper")).unwrap();

    let mut client = Client::connect(harness.addr).await;
    for _ in 0..3 {
        assert_eq!(client.cmd("CWD ..").await, "250 CWD set to /");
        assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory");
    }
    assert_eq!(client.cmd("CDUP").await, "250 CWD set to /");

    assert_eq!(client.cmd("CWD sub").await, "250 CWD set to /sub");
    assert_eq!(client.cmd("PWD").await, "257 \"/sub\" is current directory");
    assert_eq!(
        client.cmd("CWD ./deeper/../deeper").await,
        "250 CWD set to /sub/deeper"
    );
    assert_eq!(client.cmd("CWD ../../../..").await, "250 CWD set to /");
    assert_eq!(client.cmd("CWD nowhere").await, "500 Target is not valid");
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory");
    harness.stop().await;
}

#[tokio::test]
async fn test_port_parsing_and_clearing() {
    let harness = Harness::start().await;
    harness.write_file("present.txt", b"here");

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(
        client.cmd("PORT 127,0,0,1,200,5").await,
        "200 Port is set to 51205"
    );
    assert!(client.cmd("PORT 127,0,x,1,200,5").await.starts_with("500 "));
    assert_eq!(client.cmd("RETR present.txt").await, "451 Need PORT command");

    assert!(client.cmd("PORT 1,2,3").await.starts_with("500 "));
    // Under the default policy the host must be the client itself.
    assert!(client.cmd("PORT 10,9,8,7,4,1").await.starts_with("500 "));
    harness.stop().await;
}

#[tokio::test]
async fn test_loopback_policy_ignores_advertised_host() {
    let harness = Harness::start_with(|config| {
        config.server.data_host_policy = DataHostPolicy::Loopback;
    })
    .await;
    harness.write_file("present.txt", b"here");

    let mut client = Client::connect(harness.addr).await;
    let data = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = data.local_addr().unwrap().port();
    assert_eq!(
        client
            .cmd(&format!("PORT 10,9,8,7,{},{}", port >> 8, port & 0xff))
            .await,
        format!("200 Port is set to {}", port)
    );
    let received = download(data);
    assert!(client.cmd("RETR present.txt").await.starts_with("150 "));
    assert_eq!(client.reply().await, "226 Done");
    assert_eq!(received.await.unwrap(), b"here");
    harness.stop().await;
}

#[tokio::test]
async fn test_refused_data_connection_is_425_and_clears_port() {
    let harness = Harness::start().await;
    harness.write_file("present.txt", b"here");

    let mut client = Client::connect(harness.addr).await;
    let data = client.port().await;
    drop(data);

    assert!(client.cmd("RETR present.txt").await.starts_with("150 "));
    assert!(client.reply().await.starts_with("425 "));
    assert_eq!(client.cmd("RETR present.txt").await, "451 Need PORT command");

    client.cmd("QUIT").await;
    let summaries = harness.stop().await;
    assert!(summaries[0].transfers.is_empty());
}

#[tokio::test]
async fn test_argument_validation_and_fixed_replies() {
    let harness = Harness::start().await;

    let mut client = Client::connect(harness.addr).await;
    for verb in ["CWD", "RETR", "STOR", "TYPE", "PORT"] {
        assert_eq!(client.cmd(verb).await, "501 No argument", "{}", verb);
    }
    assert_eq!(
        client.cmd("TYPE A").await,
        "504 Only binary data transfer type accepted"
    );
    assert_eq!(
        client.cmd("type i").await,
        "200 Transfer type is set to 'Binary data'"
    );
    assert_eq!(client.cmd("PASV").await, "502 Not yet implemented");
    assert_eq!(client.cmd("MKD stuff").await, "502 Not yet implemented");
    assert_eq!(client.cmd("SYST").await, "215 UNIX Type: L8");
    assert_eq!(client.cmd("noop").await, "200 OK");
    assert_eq!(client.cmd("").await, "500 Empty command");
    harness.stop().await;
}

#[tokio::test]
async fn test_bare_newline_is_accepted() {
    let harness = Harness::start().await;

    let mut client = Client::connect(harness.addr).await;
    client.writer.write_all(b"NOOP\n").await.unwrap();
    assert_eq!(client.reply().await, "200 OK");
    harness.stop().await;
}

#[tokio::test]
async fn test_quit_closes_connection() {
    let harness = Harness::start().await;

    let mut client = Client::connect(harness.addr).await;
    client.port().await;
    assert_eq!(client.cmd("QUIT").await, "221 Thank you for using VolcanoFTP");
    assert!(client.closed().await);
    assert_eq!(harness.stop().await.len(), 1);
}

#[tokio::test]
async fn test_disconnect_still_records_stats() {
    let harness = Harness::start().await;

    let client = Client::connect(harness.addr).await;
    drop(client);

    // Give the worker a moment to notice EOF before shutting down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let summaries = harness.stop().await;
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].duration >= 0.0);
}

#[tokio::test]
async fn test_concurrent_sessions_each_get_a_record() {
    let harness = Harness::start().await;
    harness.write_file("shared.txt", b"shared content");

    let mut sessions = Vec::new();
    for _ in 0..8 {
        let addr = harness.addr;
        sessions.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            let received = download(client.port().await);
            assert!(client.cmd("RETR shared.txt").await.starts_with("150 "));
            assert_eq!(client.reply().await, "226 Done");
            assert_eq!(received.await.unwrap(), b"shared content");
            assert!(client.cmd("QUIT").await.starts_with("221 "));
            assert!(client.closed().await);
        }));
    }
    for session in sessions {
        session.await.unwrap();
    }

    let summaries = harness.stop().await;
    assert_eq!(summaries.len(), 8);
    let mut ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert!(summaries.iter().all(|s| s.transfers == vec![14]));
}

#[tokio::test]
async fn test_shutdown_tears_down_live_sessions() {
    let mut harness = Harness::start().await;

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(client.cmd("NOOP").await, "200 OK");

    harness.begin_shutdown();
    assert_eq!(client.reply().await, "421 Server is shutting down");
    assert!(client.closed().await);
    assert_eq!(harness.finish().await.len(), 1);
}

#[tokio::test]
async fn test_idle_session_is_closed() {
    let harness = Harness::start_with(|config| {
        config.server.idle_timeout_secs = 1;
    })
    .await;

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(
        client.reply().await,
        "421 Idle timeout, closing control connection"
    );
    assert!(client.closed().await);
    harness.stop().await;
}

async fn exploding_handler(
    _ctx: SessionContext,
    _args: Vec<String>,
) -> Result<(), std::io::Error> {
    panic!("handler blew up");
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let mut handlers = initialize_command_handlers();
    handlers.insert(FtpCommand::NOOP, boxed(exploding_handler));
    let harness = Harness::start_with_handlers(|_| {}, handlers).await;

    let mut client = Client::connect(harness.addr).await;
    assert_eq!(client.cmd("PWD").await, "257 \"/\" is current directory");
    assert_eq!(
        client.cmd("NOOP").await,
        "421 Something unexpected happened"
    );
    assert!(client.closed().await);

    // Other sessions are unaffected.
    let mut other = Client::connect(harness.addr).await;
    assert_eq!(other.cmd("SYST").await, "215 UNIX Type: L8");
    assert!(other.cmd("QUIT").await.starts_with("221 "));

    assert_eq!(harness.stop().await.len(), 2);
}

#[tokio::test]
async fn test_dropped_download_is_426_with_partial_count() {
    let harness = Harness::start().await;
    let payload = vec![0x5au8; 32 * 1024 * 1024];
    harness.write_file("big.bin", &payload);

    let mut client = Client::connect(harness.addr).await;
    let data = client.port().await;
    client.send("RETR big.bin").await;
    assert!(client.reply().await.starts_with("150 "));
    let (stream, _) = timeout(STEP, data.accept()).await.unwrap().unwrap();
    drop(stream);

    assert!(client.reply().await.starts_with("426 "));
    assert_eq!(client.cmd("NOOP").await, "200 OK");
    client.cmd("QUIT").await;

    let summaries = harness.stop().await;
    assert_eq!(summaries[0].transfers.len(), 1);
    assert!(summaries[0].transfers[0] < payload.len() as u64);
    assert_eq!(summaries[0].bytes_sent, summaries[0].transfers[0]);
}

#[tokio::test]
async fn test_silent_data_connection_times_out() {
    let harness = Harness::start_with(|config| {
        config.server.idle_timeout_secs = 1;
    })
    .await;

    let mut client = Client::connect(harness.addr).await;
    let data = client.port().await;
    client.send("STOR stuck.bin").await;
    assert!(client.reply().await.starts_with("150 "));
    // Accepted but never written to.
    let (_stalled, _) = timeout(STEP, data.accept()).await.unwrap().unwrap();

    assert!(client.reply().await.starts_with("426 "));
    client.cmd("QUIT").await;

    let summaries = harness.stop().await;
    assert_eq!(summaries[0].transfers, vec![0]);
}

#[tokio::test]
async fn test_shutdown_cancels_stalled_transfer() {
    let mut harness = Harness::start_with(|config| {
        config.server.shutdown_grace_secs = 1;
    })
    .await;

    let mut client = Client::connect(harness.addr).await;
    let data = client.port().await;
    client.send("STOR stuck.bin").await;
    assert!(client.reply().await.starts_with("150 "));
    let (_stalled, _) = timeout(STEP, data.accept()).await.unwrap().unwrap();

    harness.begin_shutdown();
    assert_eq!(client.reply().await, "421 Server is shutting down");
    assert!(client.closed().await);

    let summaries = harness.finish().await;
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].transfers.is_empty());
}

#[tokio::test]
async fn test_overlong_line_is_rejected_and_session_continues() {
    let harness = Harness::start().await;

    let mut client = Client::connect(harness.addr).await;
    let long = format!("NOOP {}", "A".repeat(5000));
    assert_eq!(client.cmd(&long).await, "500 Command line too long");
    assert_eq!(client.cmd("NOOP").await, "200 OK");
    harness.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinks_cannot_leave_root() {
    let harness = Harness::start().await;
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), b"private").unwrap();
    let root = harness.root.path();
    std::fs::create_dir(root.join("sub")).unwrap();
    std::os::unix::fs::symlink(outside.path(), root.join("escape")).unwrap();
    std::os::unix::fs::symlink(outside.path().join("secret.txt"), root.join("secret.txt")).unwrap();
    std::os::unix::fs::symlink(root.join("sub"), root.join("alias")).unwrap();

    let mut client = Client::connect(harness.addr).await;
    let data = client.port().await;
    assert_eq!(client.cmd("RETR secret.txt").await, "451 File not found");
    assert_eq!(client.cmd("RETR escape/secret.txt").await, "451 File not found");
    assert!(no_connection_attempt(&data).await);

    assert_eq!(client.cmd("CWD escape").await, "500 Target is not valid");
    assert_eq!(client.cmd("LIST escape").await, "500 Problem occured");
    assert_eq!(client.cmd("STOR escape/new.txt").await, "451 Dir not found");
    assert_eq!(client.cmd("STOR secret.txt").await, "451 Target is not valid");
    assert_eq!(
        std::fs::read(outside.path().join("secret.txt")).unwrap(),
        b"private"
    );
    assert!(!outside.path().join("new.txt").exists());

    // Links that stay inside the root still work.
    assert_eq!(client.cmd("CWD alias").await, "250 CWD set to /alias");
    harness.stop().await;
}
