use crate::core_error::TransferError;
use crate::session::{DataPort, SessionContext, TransferDirection};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Sends `source` to the client over a fresh active-mode data connection.
///
/// The pending port is consumed up front so it never survives this call.
/// `source` and the data socket are dropped on every return path.
pub async fn transmit_data<R>(ctx: &SessionContext, mut source: R) -> Result<(), std::io::Error>
where
    R: AsyncRead + Unpin + Send,
{
    let (data_port, transfer_type) = {
        let mut session = ctx.session.lock().await;
        (session.take_data_port(), session.transfer_type)
    };
    let Some(data_port) = data_port else {
        return ctx.send_line(&TransferError::NoPort.to_ftp_response()).await;
    };

    ctx.reply(
        150,
        &format!("Opening {} data connection", transfer_type.label()),
    )
    .await?;
    let mut data_stream = match connect(ctx, data_port).await {
        Ok(stream) => stream,
        Err(e) => {
            ctx.log
                .error(&format!("Data connection to {} failed: {}", data_port.socket_addr(), e));
            return ctx.send_line(&e.to_ftp_response()).await;
        }
    };

    let buffer_size = ctx.config.server.download_buffer_size;
    let idle = ctx.config.server.idle_timeout();
    let (bytes, mut result) = copy_counted(&mut source, &mut data_stream, buffer_size, idle).await;
    if result.is_ok() {
        result = bounded(idle, data_stream.shutdown()).await;
    }
    drop(data_stream);
    drop(source);

    ctx.log.info(&format!("Transfered {} bytes", bytes));
    finish(ctx, bytes, TransferDirection::Sent, result).await
}

/// Receives the client's upload into the sink produced by `open_sink`.
///
/// The sink is only opened once a data port is known, so a STOR without
/// PORT leaves the filesystem untouched.
pub async fn receive_data<F, Fut, W>(ctx: &SessionContext, open_sink: F) -> Result<(), std::io::Error>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<W, std::io::Error>> + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (data_port, transfer_type) = {
        let mut session = ctx.session.lock().await;
        (session.take_data_port(), session.transfer_type)
    };
    let Some(data_port) = data_port else {
        return ctx.send_line(&TransferError::NoPort.to_ftp_response()).await;
    };

    let mut sink = match open_sink().await {
        Ok(sink) => sink,
        Err(e) => {
            ctx.log.error(&format!("Failed to open upload target: {}", e));
            return ctx.send_line(&TransferError::Sink(e).to_ftp_response()).await;
        }
    };

    ctx.reply(
        150,
        &format!("Opening {} data connection", transfer_type.label()),
    )
    .await?;
    let mut data_stream = match connect(ctx, data_port).await {
        Ok(stream) => stream,
        Err(e) => {
            ctx.log
                .error(&format!("Data connection to {} failed: {}", data_port.socket_addr(), e));
            return ctx.send_line(&e.to_ftp_response()).await;
        }
    };

    let buffer_size = ctx.config.server.upload_buffer_size;
    let idle = ctx.config.server.idle_timeout();
    let (bytes, result) = copy_counted(&mut data_stream, &mut sink, buffer_size, idle).await;
    drop(data_stream);
    drop(sink);

    ctx.log.info(&format!("Received {} bytes", bytes));
    finish(ctx, bytes, TransferDirection::Received, result).await
}

async fn connect(ctx: &SessionContext, data_port: DataPort) -> Result<TcpStream, TransferError> {
    let addr = data_port.socket_addr();
    let limit = ctx.config.server.data_connect_timeout();
    ctx.log.debug(&format!("Opening data connection to {}", addr));
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TransferError::Connect(e)),
        Err(_) => Err(TransferError::ConnectTimeout(limit)),
    }
}

/// Records the transfer, then replies `226` or the failure.
async fn finish(
    ctx: &SessionContext,
    bytes: u64,
    direction: TransferDirection,
    result: Result<(), std::io::Error>,
) -> Result<(), std::io::Error> {
    let index = ctx.session.lock().await.record_transfer(bytes, direction);
    ctx.log
        .debug(&format!("Transfer #{} recorded ({:?}, {} bytes)", index, direction, bytes));

    match result {
        Ok(()) => ctx.reply(226, "Done").await,
        Err(e) => {
            ctx.log.error(&format!("Transfer aborted: {}", e));
            ctx.send_line(&TransferError::Stream(e).to_ftp_response())
                .await
        }
    }
}

/// Copies until end-of-stream and flushes the writer.
///
/// Every read, write and the final flush must make progress within `idle`,
/// otherwise the copy stops with `TimedOut`. The byte count is returned even
/// when the copy fails part way.
pub async fn copy_counted<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    idle: Duration,
) -> (u64, Result<(), io::Error>)
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0; buffer_size.max(1)];
    let mut transfered: u64 = 0;

    loop {
        let bytes_read = match bounded(idle, reader.read(&mut buffer)).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return (transfered, Err(e)),
        };
        if let Err(e) = bounded(idle, writer.write_all(&buffer[..bytes_read])).await {
            return (transfered, Err(e));
        }
        transfered += bytes_read as u64;
    }

    let flushed = bounded(idle, writer.flush()).await;
    (transfered, flushed)
}

async fn bounded<T, F>(idle: Duration, op: F) -> Result<T, io::Error>
where
    F: Future<Output = Result<T, io::Error>>,
{
    match timeout(idle, op).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("Data connection idle for {:?}", idle),
        )),
    }
}
