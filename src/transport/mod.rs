//! Transport adapters: concrete `DuplexClient` sources.
//!
//! Both adapters present the same uniform duplex to the relay engine
//! regardless of whether the inbound client arrived as a WebSocket upgrade
//! or a streaming xhttp POST.

pub mod websocket;
pub mod xhttp;
