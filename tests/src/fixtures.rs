//! Test doubles for both ends of the relay.
//!
//! Everything here panics on unexpected input; it is only meant for tests.

use relay_gateway::transport::link::{self, LinkPeer};
use relay_gateway::{MemoryConnector, PrimaryConnection, RelayConfig, RelayService};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

/// Config for an in-process service: ephemeral port, fast requeue loop.
pub fn service_config(relays: &[&str]) -> RelayConfig {
    RelayConfig {
        port: 0,
        requeue_interval_ms: 50,
        relays: relays.iter().map(|r| r.to_string()).collect(),
        ..RelayConfig::default()
    }
}

/// A started service whose relays are reached through a [`MemoryConnector`].
pub async fn start_service(connector: &Arc<MemoryConnector>, relays: &[&str]) -> RelayService {
    let mut service = RelayService::new(service_config(relays), connector.clone()).unwrap();
    service.start().await.unwrap();
    service
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// The primary endpoint, attached straight to a [`PrimaryConnection`].
pub struct FakePrimary {
    peer: LinkPeer,
}

impl FakePrimary {
    pub fn connect(primary: &Arc<PrimaryConnection>) -> Self {
        let (link, peer) = link::pair(64);
        primary.accept(link);
        Self { peer }
    }

    /// Next request the relay sent us.
    pub async fn next_request(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.peer.from_local.recv())
            .await
            .expect("request in time")
            .expect("primary link open");
        serde_json::from_str(&text).unwrap()
    }

    /// True if no request is waiting right now.
    pub fn is_idle(&mut self) -> bool {
        self.peer.from_local.try_recv().is_err()
    }

    pub async fn reply_result(&self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    pub async fn reply_error(&self, request: &Value, error: &str) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "error": error}))
            .await;
    }

    async fn send(&self, frame: Value) {
        self.peer.to_local.send(frame.to_string()).await.unwrap();
    }

    /// Answer every request with `answer(method, params)` until the link closes.
    pub fn serve<F>(mut self, answer: F)
    where
        F: Fn(&str, &Value) -> Value + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(text) = self.peer.from_local.recv().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                let result = answer(request["method"].as_str().unwrap_or_default(), &request["params"]);
                self.reply_result(&request, result).await;
            }
        });
    }

    /// Drop the socket.
    pub fn disconnect(self) {}
}

/// A relay client on the far side of an outbound relay connection.
pub struct FakeRelayClient {
    peer: LinkPeer,
}

impl FakeRelayClient {
    /// Wait for the relay to connect to us.
    pub async fn accept(incoming: &mut mpsc::UnboundedReceiver<LinkPeer>) -> Self {
        let peer = tokio::time::timeout(WAIT, incoming.recv())
            .await
            .expect("relay connected in time")
            .expect("listener open");
        Self { peer }
    }

    pub async fn send_request(&self, id: u64, method: &str, params: Value) {
        let frame = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.peer.to_local.send(frame.to_string()).await.unwrap();
    }

    pub async fn send_raw(&self, text: &str) {
        self.peer.to_local.send(text.to_owned()).await.unwrap();
    }

    pub async fn next_frame(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.peer.from_local.recv())
            .await
            .expect("frame in time")
            .expect("relay link open");
        serde_json::from_str(&text).unwrap()
    }

    /// True if no frame is waiting right now.
    pub fn is_idle(&mut self) -> bool {
        self.peer.from_local.try_recv().is_err()
    }
}
