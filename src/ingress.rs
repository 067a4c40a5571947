//! Ingress dispatch: routes inbound HTTP/WebSocket requests by path and
//! method, and the `handle_client` orchestration that ties the header
//! codec, dialer, relay engine, and abort watcher together behind the
//! uniform `DuplexClient` the transport adapters produce.
//!
//! One `axum::Router`, one shared `AppState`, routes registered by path.

use crate::abort;
use crate::collaborators;
use crate::dialer;
use crate::duplex::DuplexClient;
use crate::error::{Error, Result};
use crate::relay;
use crate::settings::Settings;
use crate::transport::{websocket, xhttp};
use crate::vless::{self, VlessRequest};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// State shared across every ingress handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        AppState {
            settings: Arc::new(settings),
            http: reqwest::Client::new(),
        }
    }
}

/// Build the router: routes are registered per configured path (empty path
/// settings disable the corresponding route entirely), plus the plaintext
/// `/` landing page and a 404 fallback for everything else.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new().route("/", get(landing_page));

    if let Some(path) = state.settings.ws_path.clone() {
        router = register(router, &path, get(ws_handler));
    }
    if let Some(path) = state.settings.xhttp_path.clone() {
        router = register(
            router,
            &path,
            axum::routing::post(xhttp_handler),
        );
    }
    if let Some(path) = state.settings.doh_query_path.clone() {
        router = register(router, &path, get(doh_handler).post(doh_handler));
    }
    if let Some(path) = state.settings.ip_query_path.clone() {
        router = register(router, &path, get(ip_handler));
    }

    router
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Register `handler` at both the normalized (trailing-slash) form of
/// `path` and its bare form, so a configured path matches regardless of
/// whether the operator's env var includes a trailing slash.
fn register(router: Router<AppState>, path: &str, handler: axum::routing::MethodRouter<AppState>) -> Router<AppState> {
    let bare = path.trim_end_matches('/');
    let bare = if bare.is_empty() { "/" } else { bare };
    let router = router.route(path, handler.clone());
    if bare == path {
        router
    } else {
        router.route(bare, handler)
    }
}

async fn landing_page(State(state): State<AppState>) -> Response {
    if state.settings.uuid.is_none() {
        collaborators::help_page().into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn not_found() -> Response {
    // Deliberate: status 404 paired with reason "Bad Request", kept for
    // wire compatibility with existing clients.
    (StatusCode::NOT_FOUND, "Bad Request").into_response()
}

async fn ws_handler(
    State(state): State<AppState>,
    ws: axum::extract::ws::WebSocketUpgrade,
) -> Response {
    let settings = state.settings.clone();
    ws.on_upgrade(move |socket| async move {
        let client = websocket::adapt(socket, settings.buffer_size);
        handle_client(client, settings).await;
    })
}

async fn xhttp_handler(State(state): State<AppState>, request: axum::extract::Request) -> Response {
    let settings = state.settings.clone();
    let padding = collaborators::sample_padding(settings.xpadding_range);
    let (client, response) = xhttp::adapt(request.into_body(), settings.buffer_size, padding);

    match setup(client, &settings).await {
        Ok((client, vless, remote)) => {
            tokio::spawn(run_relay(client, remote, vless, settings));
            response
        }
        Err((client, e)) => {
            client.close();
            warn!("xhttp setup failed: {e}");
            not_found().await
        }
    }
}

async fn doh_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let accept = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    match collaborators::forward_doh(&state.http, &state.settings.upstream_doh, body.into(), accept).await {
        Ok((body, content_type)) => {
            let mut resp = Response::new(axum::body::Body::from(body));
            if let Ok(value) = axum::http::HeaderValue::from_str(&content_type) {
                resp.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
            }
            resp
        }
        Err(e) => {
            error!("doh forward failed: {e}");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

async fn ip_handler(ConnectInfo(peer): ConnectInfo<SocketAddr>, Query(_params): Query<HashMap<String, String>>) -> Response {
    Json(collaborators::ip_info(peer)).into_response()
}

/// Parse the header and dial the remote; on either failure, the client is
/// handed back (not yet closed) so the caller can log and `close()` it in
/// the right place for its transport (immediately for xhttp, since the
/// response hasn't been sent yet; only after logging for WebSocket, whose
/// 101 response is already committed).
async fn setup(
    mut client: DuplexClient,
    settings: &Settings,
) -> std::result::Result<(DuplexClient, VlessRequest, Arc<TcpStream>), (DuplexClient, Error)> {
    let Some(uuid) = settings.uuid else {
        return Err((client, Error::config("proxying disabled: no UUID configured")));
    };

    let vless = match vless::parse_header(&mut client.readable, &uuid).await {
        Ok(v) => v,
        Err(e) => return Err((client, e)),
    };

    let remote = match dialer::connect_remote(&vless.hostname, vless.port, &settings.proxy).await {
        Ok(s) => Arc::new(s),
        Err(e) => return Err((client, e)),
    };

    Ok((client, vless, remote))
}

async fn run_relay(client: DuplexClient, remote: Arc<TcpStream>, vless: VlessRequest, settings: Arc<Settings>) {
    let watcher = abort::watch(client.signal.clone(), remote.clone());
    relay::relay(
        client,
        remote,
        &vless,
        settings.relay_scheduler,
        settings.yield_size,
        settings.yield_delay,
    )
    .await;
    watcher.abort();
}

/// WebSocket entry point: the 101 response is already committed by the
/// time this runs, so setup failures are logged and swallowed rather than
/// turned into an HTTP status — there is no response left to fail.
async fn handle_client(client: DuplexClient, settings: Arc<Settings>) {
    match setup(client, &settings).await {
        Ok((client, vless, remote)) => {
            info!(hostname = %vless.hostname, port = vless.port, "relay started");
            run_relay(client, remote, vless, settings).await;
        }
        Err((client, e)) => {
            if !e.is_aborted() {
                warn!("websocket setup failed: {e}");
            }
            client.close();
        }
    }
}
