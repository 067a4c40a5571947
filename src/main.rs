//! vless-edge - CLI entry point.

// Use mimalloc as the global allocator for better p99 latency under
// many concurrent short-lived relay connections.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vless_edge::{EdgeNode, Settings, VERSION};

#[derive(Parser, Debug)]
#[command(name = "vless-edge")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "VLESS proxy edge node: WebSocket/xhttp ingress and a bidirectional relay to plain TCP")]
struct Args {
    /// Address to bind the HTTP/WebSocket/xhttp ingress to.
    #[arg(short = 'l', long = "listen", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Override the LOG_LEVEL environment setting.
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vless-edge-worker")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn async_main() -> vless_edge::Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env()?;

    init_tracing(args.log_level.as_deref().unwrap_or(&settings.log_level));

    info!("vless-edge v{VERSION} starting");

    let node = EdgeNode::new(settings);
    tokio::select! {
        result = node.serve(args.listen) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    }
}

/// `LOG_LEVEL=none` (the settings default) disables logging entirely rather
/// than mapping to a tracing level.
fn init_tracing(log_level: &str) {
    let directive = if log_level.eq_ignore_ascii_case("none") {
        "off".to_string()
    } else {
        format!("vless_edge={log_level}")
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
