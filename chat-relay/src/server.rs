//! Main ChatRelay server coordination.
//!
//! ChatRelay owns the connection registry and the broadcaster, exposes the
//! single WebSocket upgrade route, and binds the listener.

use crate::broadcast::BroadcastRelay;
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::registry::ConnectionRegistry;
use crate::session::Session;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Main relay server state, shared by every session.
#[derive(Debug)]
pub struct ChatRelay {
    config: Config,
    broadcaster: BroadcastRelay,
}

impl ChatRelay {
    /// Create a new ChatRelay with an empty registry.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = BroadcastRelay::new(registry, config.limits.write_timeout());
        Self {
            config,
            broadcaster,
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.broadcaster.registry()
    }

    /// Get the broadcaster sessions relay through.
    pub fn broadcaster(&self) -> &BroadcastRelay {
        &self.broadcaster
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.registry().len().await
    }
}

/// Build the router with the upgrade endpoint at the configured path.
pub fn build_router(relay: Arc<ChatRelay>) -> Router {
    let path = relay.config().server.path.clone();
    Router::new()
        .route(&path, get(ws_handler))
        .layer(Extension(relay))
}

/// Upgrade handler: accept the WebSocket and spawn its session.
async fn ws_handler(
    Extension(relay): Extension<Arc<ChatRelay>>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!("Rejected upgrade request: {}", rejection);
            return rejection.into_response();
        }
    };

    let session = Session::new(relay.broadcaster().clone());
    let id = session.id();

    upgrade
        .max_message_size(relay.config().limits.max_message_size)
        .on_failed_upgrade(|e: axum::Error| tracing::warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            match session.run(socket).await {
                Ok(()) => tracing::info!("Client {} closed the connection", id),
                Err(e) => tracing::warn!("Client {} disconnected or read error: {}", id, e),
            }
        })
}

/// Bind the listener and start serving. Returns a handle to the running server.
///
/// # Errors
///
/// Returns [`RelayError::Bind`] if the configured address cannot be bound.
pub async fn start(config: Config) -> Result<RelayHandle> {
    let address = config.server.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| RelayError::Bind {
            address: address.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let relay = Arc::new(ChatRelay::new(config));
    let router = build_router(Arc::clone(&relay));

    tracing::info!(
        "Listening on {} (path: {})",
        local_addr,
        relay.config().server.path
    );

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(RelayHandle {
        local_addr,
        relay,
        task,
    })
}

/// Handle returned by [`start`]; keeps access to the running relay.
#[derive(Debug)]
pub struct RelayHandle {
    local_addr: SocketAddr,
    relay: Arc<ChatRelay>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The running relay.
    pub fn relay(&self) -> &Arc<ChatRelay> {
        &self.relay
    }

    /// Wait until the server task exits.
    pub async fn wait(&mut self) {
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Server task failed: {}", e);
        }
    }

    /// Stop accepting connections. Running sessions are not drained.
    pub fn abort(&self) {
        self.task.abort();
    }
}
