//! vless-edge - a VLESS proxy edge node.
//!
//! Terminates inbound client connections tunneled over WebSocket or a
//! streaming xhttp transport, parses the VLESS request header to discover a
//! target host and port, dials out to that target over plain TCP, and
//! relays bytes bidirectionally under bounded buffering and cooperative
//! cancellation.
//!
//! # Architecture
//!
//! ```text
//!   ingress (axum Router) -> transport adapter (ws | xhttp) -> DuplexClient
//!                                                                    |
//!                                                              vless header
//!                                                                    |
//!                                                                 dialer
//!                                                                    |
//!                                                            relay (pipe|yield) <-> remote TCP
//!                                                                    ^
//!                                                             abort watcher
//! ```

pub mod abort;
pub mod buffer;
pub mod collaborators;
pub mod dialer;
pub mod duplex;
pub mod error;
pub mod ingress;
pub mod relay;
pub mod settings;
pub mod transport;
pub mod vless;

pub use error::{Error, Result};
pub use settings::Settings;

use ingress::AppState;
use std::net::SocketAddr;
use tracing::info;

/// Crate version, reported in the CLI `--version` output and on boot.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The running edge node: owns the loaded settings and serves ingress
/// traffic until the listener is shut down.
pub struct EdgeNode {
    settings: Settings,
}

impl EdgeNode {
    pub fn new(settings: Settings) -> Self {
        EdgeNode { settings }
    }

    /// Bind `addr` and serve the ingress router until the process is
    /// signaled to stop. Each accepted connection is handled on its own
    /// spawned task by the router's handlers (`ingress::ws_handler` /
    /// `ingress::xhttp_handler`); there is no shared mutable state between
    /// concurrent requests.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        if self.settings.uuid.is_none() {
            info!("UUID is unset: proxying disabled, serving the help page only");
        }

        let state = AppState::new(self.settings);
        let router = ingress::build_router(state);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(%addr, "vless-edge listening");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
