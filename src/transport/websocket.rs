//! WebSocket transport adapter: wraps a server-side `axum` WebSocket
//! endpoint into a `DuplexClient`.
//!
//! The usual `WebSocketUpgrade` / `on_upgrade` shape, adapting a
//! bidirectional message stream into a uniform byte duplex.

use crate::duplex::DuplexClient;
use axum::extract::ws::{Message, WebSocket};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, PollSender};
use tracing::debug;

/// Default channel capacity (in messages) when `BUFFER_SIZE` is unset.
/// `BUFFER_SIZE` is specified in bytes in the settings model; mpsc
/// channels are sized by item count, so we approximate the high-water
/// mark by assuming a conservative average message size.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const ASSUMED_MESSAGE_SIZE: usize = 4096;

fn channel_capacity(buffer_size: Option<usize>) -> usize {
    match buffer_size {
        Some(bytes) => (bytes / ASSUMED_MESSAGE_SIZE).max(1),
        None => DEFAULT_CHANNEL_CAPACITY,
    }
}

/// Tracks the two halves independently; the socket is only torn down once
/// both the client-to-remote read side and the remote-to-client write side
/// have finished, so an in-flight send isn't lost if the reader ends first.
struct TwoFlagClose {
    reading_done: AtomicBool,
    writing_done: AtomicBool,
    torn_down: AtomicBool,
    reader: tokio::task::JoinHandle<()>,
    writer: tokio::task::JoinHandle<()>,
}

impl TwoFlagClose {
    fn mark_reading_done(self: &Arc<Self>) {
        self.reading_done.store(true, Ordering::SeqCst);
        self.maybe_teardown();
    }

    fn mark_writing_done(self: &Arc<Self>) {
        self.writing_done.store(true, Ordering::SeqCst);
        self.maybe_teardown();
    }

    fn maybe_teardown(self: &Arc<Self>) {
        if self.reading_done.load(Ordering::SeqCst) && self.writing_done.load(Ordering::SeqCst) {
            self.force_teardown();
        }
    }

    /// Idempotent forced close — safe to call repeatedly or concurrently.
    fn force_teardown(self: &Arc<Self>) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("websocket transport closing");
        self.reader.abort();
        self.writer.abort();
    }
}

/// Adapt an accepted `WebSocket` into a `DuplexClient`.
pub fn adapt(socket: WebSocket, buffer_size: Option<usize>) -> DuplexClient {
    let signal = CancellationToken::new();
    let capacity = channel_capacity(buffer_size);

    let (mut sink, mut stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(capacity);

    let reader_signal = signal.clone();
    let reader = tokio::spawn(async move {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(v))) => {
                    if inbound_tx.send(Bytes::from(v)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(s))) => {
                    if inbound_tx.send(Bytes::from(s.into_bytes())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    reader_signal.cancel();
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/Pong are handled by axum itself.
                }
                Some(Err(e)) => {
                    debug!("websocket read error: {e}");
                    reader_signal.cancel();
                    break;
                }
            }
        }
    });

    let writer_signal = signal.clone();
    let writer = tokio::spawn(async move {
        let mut rx = outbound_rx;
        while let Some(chunk) = rx.recv().await {
            if sink.send(Message::Binary(chunk.to_vec())).await.is_err() {
                writer_signal.cancel();
                break;
            }
        }
        let _ = sink.close().await;
    });

    let state = Arc::new(TwoFlagClose {
        reading_done: AtomicBool::new(false),
        writing_done: AtomicBool::new(false),
        torn_down: AtomicBool::new(false),
        reader,
        writer,
    });

    let close_state = state.clone();
    let closer: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        close_state.force_teardown();
    });

    let reading_done_state = state.clone();
    let reading_done_hook: Box<dyn FnOnce() + Send> = Box::new(move || {
        reading_done_state.mark_reading_done();
    });

    let writing_done_sender = WsSender {
        inner: PollSender::new(outbound_tx),
        on_drop_done: Some(state),
    };

    let mut client = DuplexClient::new(
        Box::pin(WsReceiver {
            rx: inbound_rx,
            pending: BytesMut::new(),
        }),
        Box::pin(writing_done_sender),
        signal,
        closer,
    );
    client.reading_done = Some(reading_done_hook);
    client
}

struct WsReceiver {
    rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
}

impl AsyncRead for WsReceiver {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.pending.is_empty() {
            let n = buf.remaining().min(self.pending.len());
            buf.put_slice(&self.pending.split_to(n));
            return Poll::Ready(Ok(()));
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                let n = buf.remaining().min(chunk.len());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.pending.extend_from_slice(&chunk[n..]);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Marks the writing half done (for the two-flag close) once the sender is
/// dropped — i.e. once the relay's download pump finishes with this as its
/// destination.
struct WsSender {
    inner: PollSender<Bytes>,
    on_drop_done: Option<Arc<TwoFlagClose>>,
}

impl AsyncWrite for WsSender {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.inner.poll_reserve(cx) {
            Poll::Ready(Ok(())) => {
                let chunk = Bytes::copy_from_slice(buf);
                match self.inner.send_item(chunk) {
                    Ok(()) => Poll::Ready(Ok(buf.len())),
                    // The reader task already exited; the abort will be
                    // observed by the relay, not propagated here.
                    Err(_) => Poll::Ready(Ok(buf.len())),
                }
            }
            Poll::Ready(Err(_)) => Poll::Ready(Ok(buf.len())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.close();
        Poll::Ready(Ok(()))
    }
}

impl Drop for WsSender {
    fn drop(&mut self) {
        if let Some(state) = self.on_drop_done.take() {
            state.mark_writing_done();
        }
    }
}
