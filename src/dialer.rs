//! Outbound dialer: timed TCP connect with an optional single-attempt
//! fallback to a configured relay host.

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(8000);

/// Attempt a direct connect to `(host, port)`; on failure, if `relays` is
/// non-empty, pick one uniformly at random and attempt a single connect to
/// `(relay, port)` with the same timeout.
pub async fn connect_remote(host: &str, port: u16, relays: &[String]) -> Result<TcpStream> {
    match timed_connect(host, port).await {
        Ok(stream) => return Ok(stream),
        Err(e) => debug!("direct connect to {host}:{port} failed: {e}"),
    }

    if let Some(relay) = pick_random_relay(relays) {
        debug!("falling back to relay {relay}:{port}");
        return timed_connect(relay, port).await.map_err(|_| Error::AllAttemptsFailed);
    }

    Err(Error::AllAttemptsFailed)
}

async fn timed_connect(host: &str, port: u16) -> Result<TcpStream> {
    match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            configure_remote_socket(&stream);
            Ok(stream)
        }
        Ok(Err(e)) => Err(Error::connect_failed(e.to_string())),
        Err(_) => Err(Error::ConnectTimeout),
    }
}

/// Disables Nagle's algorithm on the outbound socket — every remote hop is
/// a relayed proxy connection, not a bulk transfer, so latency beats
/// coalescing.
fn configure_remote_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}

/// Uniformly random selection from a relay host list.
///
/// `pick_random_relay(&[])` is `None`; `pick_random_relay(&["a".into()])` is
/// always `Some("a")`.
fn pick_random_relay(relays: &[String]) -> Option<&str> {
    relays
        .choose(&mut rand::thread_rng())
        .map(|s| s.as_str())
}
