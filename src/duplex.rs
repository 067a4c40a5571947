//! The uniform duplex interface the relay engine consumes, regardless of
//! whether the inbound client arrived over WebSocket or xhttp.

use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// A client-facing duplex: one reader, one writer, an abort token, and a
/// forceful teardown hook.
///
/// The reader and writer are plain owned fields (not guarded behind
/// `&mut self` trait methods) so the relay engine can move each into its
/// own pump future without fighting the borrow checker over two mutable
/// borrows of one object — this is the Rust expression of "handing them to
/// the relay transfers exclusive use until release".
pub struct DuplexClient {
    pub readable: Pin<Box<dyn AsyncRead + Send>>,
    pub writable: Pin<Box<dyn AsyncWrite + Send>>,
    pub signal: CancellationToken,
    /// Invoked by the relay once the client-to-remote direction finishes,
    /// success or failure.
    pub reading_done: Option<Box<dyn FnOnce() + Send>>,
    closer: Arc<dyn Fn() + Send + Sync>,
}

impl DuplexClient {
    pub fn new(
        readable: Pin<Box<dyn AsyncRead + Send>>,
        writable: Pin<Box<dyn AsyncWrite + Send>>,
        signal: CancellationToken,
        closer: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        DuplexClient {
            readable,
            writable,
            signal,
            reading_done: None,
            closer,
        }
    }

    /// Forceful teardown of the transport. Idempotent — the transport
    /// adapter behind `closer` is responsible for tolerating repeat calls.
    pub fn close(&self) {
        (self.closer)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_close_is_idempotent_and_forwards() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let client = DuplexClient::new(
            Box::pin(Cursor::new(Vec::<u8>::new())),
            Box::pin(tokio::io::sink()),
            CancellationToken::new(),
            Arc::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        client.close();
        client.close();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
