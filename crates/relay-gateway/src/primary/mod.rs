//! Primary Connection Manager.
//!
//! Owns the single logical channel to the primary endpoint. At most one
//! primary is active; accepting a new one invalidates the previous one, whose
//! in-flight requests are rejected and whose later frames are ignored.
//!
//! Each accepted socket gets a generation number. Pending requests remember
//! the generation they were sent on, so a disconnect only rejects the
//! requests that can no longer be answered.

use crate::domain::error::{ErrorClassifier, RemoteError, RemoteResult};
use crate::domain::ids::IdAllocator;
use crate::domain::message::{Message, Request};
use crate::domain::pending::{PendingRequestTable, Resolution};
use crate::transport::link::SocketLink;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryEvent {
    Connected { generation: u64 },
    Disconnected { generation: u64 },
}

/// The active primary socket.
struct PrimaryHandle {
    generation: u64,
    outbound: mpsc::Sender<String>,
}

/// A request the primary has been sent, waiting for its answer.
#[must_use = "the answer is only collected by awaiting `response`"]
pub struct InFlight {
    id: u64,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Resolution>,
    pending: Arc<PendingRequestTable>,
}

impl InFlight {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the answer until the request's deadline.
    pub async fn response(self) -> RemoteResult<Value> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(RemoteError::disconnected("pending request abandoned")),
            Err(_) => {
                self.pending.expire(self.id);
                Err(RemoteError::timeout(self.timeout))
            }
        }
    }
}

pub struct PrimaryConnection {
    active: RwLock<Option<PrimaryHandle>>,
    generations: AtomicU64,
    ids: Arc<IdAllocator>,
    pending: Arc<PendingRequestTable>,
    classifier: RwLock<ErrorClassifier>,
    timeout_ms: AtomicU64,
    connected_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<PrimaryEvent>,
}

impl PrimaryConnection {
    pub fn new(ids: Arc<IdAllocator>, pending: Arc<PendingRequestTable>, timeout: Duration) -> Self {
        let (connected_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(64);
        Self {
            active: RwLock::new(None),
            generations: AtomicU64::new(0),
            ids,
            pending,
            classifier: RwLock::new(ErrorClassifier::default()),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            connected_tx,
            events_tx,
        }
    }

    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    pub fn pending(&self) -> &Arc<PendingRequestTable> {
        &self.pending
    }

    pub fn is_connected(&self) -> bool {
        self.active.read().is_some()
    }

    /// Generation of the active primary, if any.
    pub fn generation(&self) -> Option<u64> {
        self.active.read().as_ref().map(|h| h.generation)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Applies to requests sent after the call.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_classifier(&self, classifier: ErrorClassifier) {
        *self.classifier.write() = classifier;
    }

    /// Subscribe to connect/disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PrimaryEvent> {
        self.events_tx.subscribe()
    }

    /// Resolve once a primary is connected; immediately if one already is.
    ///
    /// Unbounded: wrap in `tokio::time::timeout` if a deadline is needed.
    pub async fn await_connection(&self) {
        let mut connected = self.connected_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = connected.wait_for(|connected| *connected).await;
    }

    /// Install `link` as the active primary and start reading from it.
    ///
    /// Returns the generation assigned to this socket.
    pub fn accept(self: &Arc<Self>, link: SocketLink) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let SocketLink {
            outbound,
            mut inbound,
        } = link;

        let previous = {
            let mut active = self.active.write();
            let previous = active.replace(PrimaryHandle {
                generation,
                outbound,
            });
            self.connected_tx.send_replace(true);
            previous
        };

        if let Some(previous) = previous {
            let rejected = self.pending.reject_generation(
                previous.generation,
                RemoteError::disconnected("primary connection replaced"),
            );
            info!(
                previous = previous.generation,
                generation, rejected, "Replacing active primary connection"
            );
        }

        let _ = self.events_tx.send(PrimaryEvent::Connected { generation });
        info!(generation, "Primary connected");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                this.handle_message(generation, &text);
            }
            this.detach(generation);
        });

        generation
    }

    /// Send a request under a fresh id.
    ///
    /// `Ok(None)` means no primary is connected: try again later. No pending
    /// entry is created and no timer is started in that case.
    pub async fn send(&self, method: &str, params: Value) -> RemoteResult<Option<Value>> {
        if !self.is_connected() {
            debug!(method = method, "No primary connected");
            return Ok(None);
        }
        let request = Request::new(self.ids.next_id(), method, params);
        self.send_request(request).await
    }

    /// Send a request whose id was already allocated.
    pub async fn send_request(&self, request: Request) -> RemoteResult<Option<Value>> {
        match self.transmit(request).await? {
            Some(in_flight) => in_flight.response().await.map(Some),
            None => Ok(None),
        }
    }

    /// Register `request` and hand it to the primary socket, without waiting
    /// for the answer.
    ///
    /// Requests transmitted one after another reach the primary in that
    /// order. `Ok(None)` means no primary is connected. The deadline starts
    /// here and covers both the wait for buffer space and the wait for the
    /// answer.
    pub async fn transmit(&self, request: Request) -> RemoteResult<Option<InFlight>> {
        let Some(id) = request.id.as_u64() else {
            return Err(RemoteError::failed("request id must be an unsigned integer"));
        };
        let Some((generation, outbound)) = self.current() else {
            debug!(request_id = id, method = %request.method, "No primary connected");
            return Ok(None);
        };

        let timeout = self.timeout();
        let deadline = Instant::now() + timeout;
        let rx = self.pending.register(id, &request.method, generation, timeout);

        // The primary may have been swapped out between `current()` and
        // `register()`, after its pending entries were already rejected.
        if self.generation() != Some(generation) {
            self.pending.cancel(id);
            return Err(RemoteError::disconnected("primary connection closed"));
        }

        match tokio::time::timeout_at(deadline, outbound.send(request.to_text())).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.pending.cancel(id);
                return Err(RemoteError::disconnected(
                    "primary connection closed before the request was sent",
                ));
            }
            Err(_) => {
                self.pending.expire(id);
                return Err(RemoteError::timeout(timeout));
            }
        }

        debug!(request_id = id, method = %request.method, generation, "Sent request to primary");

        Ok(Some(InFlight {
            id,
            timeout,
            deadline,
            rx,
            pending: Arc::clone(&self.pending),
        }))
    }

    /// Drop the active primary and reject everything in flight.
    pub fn close(&self) {
        let handle = {
            let mut active = self.active.write();
            let Some(handle) = active.take() else {
                return;
            };
            self.connected_tx.send_replace(false);
            handle
        };
        let rejected = self
            .pending
            .reject_all(RemoteError::disconnected("relay shutting down"));
        let _ = self.events_tx.send(PrimaryEvent::Disconnected {
            generation: handle.generation,
        });
        info!(generation = handle.generation, rejected, "Primary connection closed");
    }

    fn current(&self) -> Option<(u64, mpsc::Sender<String>)> {
        self.active
            .read()
            .as_ref()
            .map(|h| (h.generation, h.outbound.clone()))
    }

    fn handle_message(&self, generation: u64, text: &str) {
        if self.generation() != Some(generation) {
            debug!(generation, "Dropping frame from replaced primary");
            return;
        }

        let response = match Message::parse(text) {
            Ok(Message::Response(response)) => response,
            Ok(Message::Request(request)) => {
                warn!(method = %request.method, "Primary sent a request; dropping");
                return;
            }
            Err(e) => {
                warn!(generation, error = %e, "Dropping malformed message from primary");
                return;
            }
        };

        let Some(id) = response.id.as_u64() else {
            warn!(id = %response.id, "Dropping response with a non-integer id");
            return;
        };

        let resolution: Resolution = match (response.error, response.result) {
            (Some(error), _) => {
                let kind = self.classifier.read().classify(&error);
                Err(RemoteError::new(kind, error))
            }
            (None, None) => Err(RemoteError::failed(
                "response carried neither a result nor an error",
            )),
            (None, Some(result)) => Ok(result),
        };

        self.pending.resolve(id, resolution);
    }

    fn detach(&self, generation: u64) {
        let removed = {
            let mut active = self.active.write();
            if active.as_ref().map(|h| h.generation) != Some(generation) {
                None
            } else {
                // Flip the flag under the guard so a concurrent accept cannot
                // be overwritten with a stale `false`.
                self.connected_tx.send_replace(false);
                active.take()
            }
        };

        if removed.is_none() {
            debug!(generation, "Replaced primary socket closed");
            return;
        }

        let rejected = self.pending.reject_generation(
            generation,
            RemoteError::disconnected("primary connection closed"),
        );
        let _ = self.events_tx.send(PrimaryEvent::Disconnected { generation });
        info!(generation, rejected, "Primary disconnected");
    }
}
