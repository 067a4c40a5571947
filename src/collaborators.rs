//! Thin boundary helpers kept outside the relay core: DNS-over-HTTPS
//! forwarding, the client-IP info endpoint, and the plaintext help page
//! shown when proxying is disabled. None of these carry the wire-level or
//! concurrency complexity the core does; they exist here only so ingress
//! dispatch has something real to call.

use crate::settings::parse_xpadding_range;
use rand::Rng;
use serde_json::{json, Value};
use std::net::SocketAddr;
use uuid::Uuid;

/// Sample a `'0'`-filled padding string from a `"a-b"` range (a length
/// uniformly in `[a,b]`); malformed input or `"0"` disables padding.
pub fn random_padding(raw: &str) -> Option<String> {
    sample_padding(parse_xpadding_range(raw))
}

/// Same sampling as `random_padding`, but over an already-parsed range —
/// what `Settings` hands the xhttp adapter on every request so the range
/// string isn't re-parsed per connection.
pub fn sample_padding(range: Option<(u32, u32)>) -> Option<String> {
    let (lo, hi) = range?;
    let len = rand::thread_rng().gen_range(lo..=hi);
    Some("0".repeat(len as usize))
}

/// Forward a DNS-over-HTTPS query body to the configured upstream resolver
/// and return its response bytes and content-type verbatim.
///
/// This is a pass-through, not a resolver: no caching, no retries, no
/// content negotiation beyond what the upstream already returns.
pub async fn forward_doh(
    client: &reqwest::Client,
    upstream: &str,
    query: bytes::Bytes,
    accept: Option<&str>,
) -> Result<(Vec<u8>, String), reqwest::Error> {
    let response = client
        .post(upstream)
        .header("content-type", accept.unwrap_or("application/dns-message"))
        .body(query)
        .send()
        .await?
        .error_for_status()?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/dns-message")
        .to_string();

    let body = response.bytes().await?.to_vec();
    Ok((body, content_type))
}

/// JSON body for the client-IP info endpoint: just the peer address as seen
/// by this edge, the way a reverse proxy's `X-Forwarded-For` debug endpoint
/// would.
pub fn ip_info(peer: SocketAddr) -> Value {
    json!({ "ip": peer.ip().to_string() })
}

/// Plaintext help message shown when `UUID` is unset (proxying disabled):
/// a freshly generated example UUID plus a couple of random lowercase
/// base-36 paths, so an operator can see the expected shape of a working
/// configuration without the edge ever having proxied a byte.
pub fn help_page() -> String {
    let example_uuid = Uuid::new_v4();
    let ws_path = random_base36_path(8);
    let xhttp_path = random_base36_path(8);

    format!(
        "This edge node has no UUID configured — proxying is disabled.\n\
         Set UUID to a v4 UUID to enable it, for example:\n\
         \n\
         \tUUID={example_uuid}\n\
         \tWS_PATH=/{ws_path}\n\
         \tXHTTP_PATH=/{xhttp_path}\n"
    )
}

fn random_base36_path(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
