//! Abort propagation: a single-producer, multi-observer one-shot flag, and
//! a best-effort watcher that reclaims the remote socket if a pump gets
//! stuck after the client aborts.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Spawn a best-effort watcher: polls `signal` every 3s; once it fires,
/// waits a further 3s grace period (to let in-flight bytes drain) and then
/// force-closes `remote`.
///
/// Errors closing the remote are logged, not propagated — pumps observing
/// the same abort will typically unwind on their own; this task exists
/// only to reclaim sockets stuck reading from a half-open remote.
pub fn watch(signal: CancellationToken, remote: Arc<TcpStream>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if signal.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = signal.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }

        tokio::time::sleep(GRACE_PERIOD).await;

        let sock = socket2::SockRef::from(remote.as_ref());
        match sock.shutdown(std::net::Shutdown::Both) {
            Ok(()) => debug!("abort watcher force-closed remote"),
            Err(e) => warn!("abort watcher failed to close remote: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_watch_closes_remote_after_grace_period() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = TcpStream::connect(addr).await.unwrap();
        let remote = Arc::new(client);
        let _server_side = accept.await.unwrap();

        let signal = CancellationToken::new();
        let handle = watch(signal.clone(), remote.clone());

        signal.cancel();
        tokio::time::advance(POLL_INTERVAL + GRACE_PERIOD + Duration::from_millis(1)).await;
        handle.await.unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(remote.as_ref().try_read(&mut buf).unwrap(), 0);
    }
}
