//! chat-relay binary entry point.
//!
//! Usage:
//! ```bash
//! chat-relay --config relay.toml
//! chat-relay                        # ./relay.toml if present, else defaults
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default: `info`).

use sealed_chat_relay::config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("chat-relay v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load(get_config_path().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut handle = match sealed_chat_relay::start(config).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for ctrl+c: {}", e);
            }
            tracing::info!("Shutting down");
        }
        _ = handle.wait() => {
            tracing::error!("Server stopped unexpectedly");
            std::process::exit(1);
        }
    }
}

fn get_config_path() -> Option<PathBuf> {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
}
