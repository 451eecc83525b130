//! Primary listener.
//!
//! Serves the WebSocket upgrade the primary endpoint connects to at `/`,
//! plus `/health` and `/status` for operators. Each upgraded socket is handed
//! to [`PrimaryConnection::accept`] as a [`SocketLink`](crate::transport::link::SocketLink).

use crate::domain::config::RelayConfig;
use crate::domain::error::GatewayError;
use crate::relay::RelaySet;
use crate::status::RelayStatus;
use crate::transport::link::{self, LinkPeer};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// How long `shutdown` waits for the server to drain before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Socket tuning for the listener.
#[derive(Debug, Clone, Copy)]
pub struct ListenerOptions {
    pub link_buffer: usize,
    pub max_message_size: usize,
}

impl ListenerOptions {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            link_buffer: config.link_buffer,
            max_message_size: config.max_message_size,
        }
    }
}

#[derive(Clone)]
struct ListenerState {
    relays: Arc<RelaySet>,
    options: ListenerOptions,
    local_addr: SocketAddr,
    started_at: DateTime<Utc>,
}

/// A bound, running primary listener.
pub struct PrimaryListener {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl PrimaryListener {
    /// Bind `addr` and start serving.
    pub async fn bind(
        addr: SocketAddr,
        relays: Arc<RelaySet>,
        options: ListenerOptions,
        started_at: DateTime<Utc>,
    ) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let router = build_router(ListenerState {
            relays,
            options,
            local_addr,
            started_at,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(addr = %local_addr, error = %e, "Primary listener failed");
            }
        });

        info!(addr = %local_addr, "Listening for primary connections");
        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Already upgraded sockets are unaffected.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.handle).await.is_err() {
            warn!(addr = %self.local_addr, "Primary listener did not stop in time, aborting");
            self.handle.abort();
        }
        info!(addr = %self.local_addr, "Primary listener stopped");
    }
}

fn build_router(state: ListenerState) -> Router {
    Router::new()
        .route("/", get(primary_upgrade))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn primary_upgrade(ws: WebSocketUpgrade, State(state): State<ListenerState>) -> impl IntoResponse {
    let options = state.options;
    ws.max_message_size(options.max_message_size)
        .on_upgrade(move |socket| serve_primary(socket, state))
}

async fn health_check(State(state): State<ListenerState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "primary_connected": state.relays.primary().is_connected(),
    }))
}

async fn status(State(state): State<ListenerState>) -> impl IntoResponse {
    Json(RelayStatus::collect(
        &state.relays,
        Some(state.local_addr),
        state.started_at,
    ))
}

/// Bridge one upgraded socket to the primary connection until either closes.
async fn serve_primary(mut socket: WebSocket, state: ListenerState) {
    let (link, mut peer) = link::pair(state.options.link_buffer);
    let generation = state.relays.primary().accept(link);

    loop {
        tokio::select! {
            outgoing = peer.from_local.recv() => match outgoing {
                Some(text) => {
                    if let Err(e) = socket.send(Message::Text(text)).await {
                        warn!(generation, error = %e, "Failed to send to primary");
                        break;
                    }
                }
                None => {
                    // Replaced or shut down
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => {
                if !forward_incoming(incoming, &peer, generation).await {
                    break;
                }
            }
        }
    }
    debug!(generation, "Primary socket closed");
}

async fn forward_incoming(
    incoming: Option<Result<Message, axum::Error>>,
    peer: &LinkPeer,
    generation: u64,
) -> bool {
    let text = match incoming {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
            Ok(text) => text,
            Err(_) => {
                debug!(generation, "Dropping non-UTF-8 binary frame");
                return true;
            }
        },
        Some(Ok(Message::Close(_))) | None => return false,
        Some(Ok(_)) => return true,
        Some(Err(e)) => {
            warn!(generation, error = %e, "Primary socket error");
            return false;
        }
    };
    peer.to_local.send(text).await.is_ok()
}
