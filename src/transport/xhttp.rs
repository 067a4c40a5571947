//! xhttp transport adapter: request body as the upload stream, a generated
//! chunked response body as the download stream.
//!
//! Built from `axum`/`http-body` primitives, generalizing the fixed-buffer
//! `Full` body to a channel-fed streaming body. The poll-based sender side
//! reuses the same `PollSender` adapter as the WebSocket transport.

use crate::duplex::DuplexClient;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::StreamBody;
use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, PollSender};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const ASSUMED_CHUNK_SIZE: usize = 4096;

fn channel_capacity(buffer_size: Option<usize>) -> usize {
    match buffer_size {
        Some(bytes) => (bytes / ASSUMED_CHUNK_SIZE).max(1),
        None => DEFAULT_CHANNEL_CAPACITY,
    }
}

/// Adapt an incoming request body into a `DuplexClient` plus the response to
/// return from the handler immediately; the response body streams whatever
/// is later written to `DuplexClient::writable`.
///
/// `x_padding` is sent as the `X-Padding` response header (a filler value
/// some clients expect to defeat traffic-size fingerprinting), not as body
/// content.
pub fn adapt(
    request_body: Body,
    buffer_size: Option<usize>,
    x_padding: Option<String>,
) -> (DuplexClient, Response) {
    let signal = CancellationToken::new();
    let capacity = channel_capacity(buffer_size);

    let data_stream = request_body
        .into_data_stream()
        .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    let readable = StreamReader::new(data_stream);

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(capacity);

    let body_stream: Pin<Box<dyn futures_util::Stream<Item = Result<Bytes, Infallible>> + Send>> =
        Box::pin(ReceiverStream::new(rx).map(Ok::<_, Infallible>));

    let body = Body::new(StreamBody::new(
        body_stream.map(|r| r.map(http_body::Frame::data)),
    ));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/grpc"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Keep-Alive"));
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_static("Go-http-client/2.0"),
    );
    if let Some(padding) = x_padding {
        if let Ok(value) = HeaderValue::from_str(&padding) {
            headers.insert("x-padding", value);
        }
    }

    let response = (StatusCode::OK, headers, body).into_response();

    let closed = Arc::new(AtomicBool::new(false));
    let writable = XhttpWriter {
        inner: PollSender::new(tx),
        closed: closed.clone(),
    };

    let closer: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        closed.store(true, Ordering::SeqCst);
    });

    let client = DuplexClient::new(Box::pin(readable), Box::pin(writable), signal, closer);
    (client, response)
}

/// Writes chunks into the mpsc channel backing the response body. Once the
/// channel's receiver is dropped — the response stream was abandoned by the
/// peer — further writes are silently absorbed rather than surfaced as relay
/// failures, matching the WebSocket writer's behavior.
struct XhttpWriter {
    inner: PollSender<Bytes>,
    closed: Arc<AtomicBool>,
}

impl AsyncWrite for XhttpWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.closed.load(Ordering::SeqCst) {
            return Poll::Ready(Ok(buf.len()));
        }
        match self.inner.poll_reserve(cx) {
            Poll::Ready(Ok(())) => {
                let _ = self.inner.send_item(Bytes::copy_from_slice(buf));
                Poll::Ready(Ok(buf.len()))
            }
            Poll::Ready(Err(_)) => {
                self.closed.store(true, Ordering::SeqCst);
                Poll::Ready(Ok(buf.len()))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.close();
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_capacity_from_buffer_size() {
        assert_eq!(channel_capacity(Some(40960)), 10);
    }

    #[test]
    fn test_channel_capacity_default() {
        assert_eq!(channel_capacity(None), DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_adapt_streams_request_body_as_readable() {
        use tokio::io::AsyncReadExt;

        let body = Body::from("hello world");
        let (mut client, _response) = adapt(body, None, None);

        let mut out = String::new();
        client.readable.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_adapt_sets_fixed_headers_and_padding() {
        let (_client, response) = adapt(Body::empty(), None, Some("00000".to_string()));
        let headers = response.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/grpc");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
        assert_eq!(headers.get(header::CONNECTION).unwrap(), "Keep-Alive");
        assert_eq!(headers.get(header::USER_AGENT).unwrap(), "Go-http-client/2.0");
        assert_eq!(headers.get("x-padding").unwrap(), "00000");
    }

    #[test]
    fn test_adapt_omits_padding_header_when_none() {
        let (_client, response) = adapt(Body::empty(), None, None);
        assert!(response.headers().get("x-padding").is_none());
    }

    #[tokio::test]
    async fn test_adapt_write_does_not_block_after_close() {
        use tokio::io::AsyncWriteExt;

        let body = Body::empty();
        let (mut client, _response) = adapt(body, None, None);
        client.close();
        client.writable.write_all(b"ignored").await.unwrap();
    }
}
