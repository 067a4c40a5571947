//! Relay engine: two pump strategies (pipe, yield) and the bidirectional
//! orchestrator that copies bytes between the client duplex and the
//! outbound remote under cancellation.

use crate::duplex::DuplexClient;
use crate::error::{Error, Result};
use crate::settings::RelayScheduler;
use crate::vless::VlessRequest;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Copy `src` into `dst`, writing `first_packet` first if non-empty, using
/// the runtime's native backpressure-aware copy and the given cancellation
/// token. On cancellation, fails with `Error::Aborted`. `dst` is shut down
/// both when the copy finishes normally (signaling end-of-stream to the
/// other side) and, best-effort, when it fails.
async fn pump_pipe<R, W>(
    mut src: R,
    mut dst: W,
    first_packet: &[u8],
    signal: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !first_packet.is_empty() {
        dst.write_all(first_packet).await?;
    }

    let result = tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Error::Aborted),
        r = tokio::io::copy(&mut src, &mut dst) => r.map(|_| ()).map_err(Error::from),
    };

    match result {
        Ok(()) => {
            dst.shutdown().await?;
            Ok(())
        }
        Err(e) => {
            if !e.is_aborted() {
                let _ = dst.shutdown().await;
            }
            Err(e)
        }
    }
}

/// Copy `src` into `dst` in bounded slices of `yield_size` bytes, sleeping
/// `yield_delay` (or yielding to the scheduler when zero) between slices,
/// and checking `signal` between reads.
///
/// On a cooperative single-threaded host this strategy exists to keep one
/// direction from starving the other; on a pre-emptively scheduled runtime
/// it remains useful purely for traffic-shaping / fairness.
async fn pump_yield<R, W>(
    mut src: R,
    mut dst: W,
    first_packet: &[u8],
    signal: &CancellationToken,
    yield_size: usize,
    yield_delay: std::time::Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !first_packet.is_empty() {
        dst.write_all(first_packet).await?;
    }

    let mut buf = vec![0u8; yield_size.max(1)];

    loop {
        if signal.is_cancelled() {
            return Err(Error::Aborted);
        }

        let n = match src.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                let _ = dst.shutdown().await;
                return Err(e.into());
            }
        };

        if n == 0 {
            dst.shutdown().await?;
            return Ok(());
        }

        if let Err(e) = dst.write_all(&buf[..n]).await {
            return Err(e.into());
        }

        if signal.is_cancelled() {
            return Err(Error::Aborted);
        }

        if yield_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(yield_delay).await;
        }
    }
}

/// Dispatch to the configured strategy; unknown values have already been
/// normalized to `Pipe` by `Settings::from_env`.
async fn pump<R, W>(
    scheduler: RelayScheduler,
    src: R,
    dst: W,
    first_packet: &[u8],
    signal: &CancellationToken,
    yield_size: usize,
    yield_delay: std::time::Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match scheduler {
        RelayScheduler::Pipe => pump_pipe(src, dst, first_packet, signal).await,
        RelayScheduler::Yield => {
            pump_yield(src, dst, first_packet, signal, yield_size, yield_delay).await
        }
    }
}

/// Run the bidirectional relay between `client` and `remote` until both
/// directions settle.
///
/// `vless.data` is written to the remote before any further client bytes
/// are forwarded; `vless.resp` is written to the client before any further
/// remote bytes are forwarded — both pumps are started concurrently so
/// there is no ordering guarantee between the two directions themselves.
pub async fn relay(
    mut client: DuplexClient,
    remote: Arc<TcpStream>,
    vless: &VlessRequest,
    scheduler: RelayScheduler,
    yield_size: usize,
    yield_delay: std::time::Duration,
) {
    let reading_done = client.reading_done.take();
    let signal = client.signal.clone();
    let first_upload: Bytes = vless.data.clone();
    let resp = vless.resp;

    let remote_write = remote.clone();
    let remote_read = remote;

    let uploader = async {
        let result = pump(
            scheduler,
            &mut client.readable,
            &*remote_write,
            &first_upload,
            &signal,
            yield_size,
            yield_delay,
        )
        .await;
        if let Some(cb) = reading_done {
            cb();
        }
        result
    };

    let downloader = pump(
        scheduler,
        &*remote_read,
        &mut client.writable,
        &resp,
        &signal,
        yield_size,
        yield_delay,
    );

    let (upload_result, download_result) = tokio::join!(uploader, downloader);

    log_direction_result("upload", &upload_result);
    log_direction_result("download", &download_result);

    debug!("relay finished");
}

fn log_direction_result(direction: &str, result: &Result<()>) {
    if let Err(e) = result {
        if !e.is_aborted() {
            error!("{direction}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::io::AsyncReadExt as _;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn test_pump_pipe_writes_first_packet_then_copies() {
        let (mut client_side, server_side) = duplex(1024);
        let (read_half, write_half) = tokio::io::split(server_side);

        let signal = CancellationToken::new();
        let handle = tokio::spawn(async move {
            pump_pipe(read_half, write_half, b"FIRST", &signal).await
        });

        let mut received = vec![0u8; 5];
        client_side.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"FIRST");

        client_side.write_all(b"more").await.unwrap();
        drop(client_side);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pump_pipe_aborts() {
        let (client_side, server_side) = duplex(1024);
        let (read_half, write_half) = tokio::io::split(server_side);
        drop(client_side);

        let signal = CancellationToken::new();
        signal.cancel();
        let result = pump_pipe(read_half, write_half, b"", &signal).await;
        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn test_pump_yield_copies_in_slices() {
        let (mut client_side, server_side) = duplex(1024);
        let (read_half, write_half) = tokio::io::split(server_side);

        let handle = tokio::spawn(async move {
            let signal = CancellationToken::new();
            pump_yield(read_half, write_half, b"", &signal, 4, Duration::ZERO).await
        });

        client_side.write_all(b"HELLOTHERE").await.unwrap();
        drop(client_side);

        handle.await.unwrap().unwrap();
    }
}
