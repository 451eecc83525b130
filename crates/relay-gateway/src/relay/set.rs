//! Relay Connection Set.
//!
//! Holds the outbound connections to relay clients. Requests arriving on a
//! relay are rewritten under a fresh local id and forwarded to the primary;
//! the answer goes back to the same relay under the id the client used.
//!
//! Addresses that fail to connect, or whose connection drops while still
//! configured, are parked in the failed set until the requeue loop retries
//! them.

use crate::domain::config::normalize_relay_address;
use crate::domain::error::{RemoteResult, RpcErrorKind};
use crate::domain::message::{json_rpc_error, json_rpc_result, Message};
use crate::primary::{InFlight, PrimaryConnection};
use crate::relay::peer::RelayPeer;
use crate::relay::queue::{RelayQueue, RelayQueueEntry};
use crate::transport::connector::RelayConnector;
use crate::transport::link::SocketLink;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened to one forwarding attempt.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Result sent back to the relay client
    Delivered,
    /// Error-shaped response sent back to the relay client
    Rejected,
    /// No primary connected; entry handed back for queueing
    Unavailable(RelayQueueEntry),
    /// Primary went away before answering; entry handed back
    ConnectionLost(RelayQueueEntry),
    /// Primary did not answer in time; entry dropped
    TimedOut,
}

/// A relayed request after the transmit step.
pub(crate) enum Dispatch {
    /// On the wire; the answer is still to come
    Sent(RelayQueueEntry, InFlight),
    /// Finished without an answer to wait for
    Settled(ForwardOutcome),
}

/// Counters for relayed traffic
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Well-formed requests received from relay clients
    pub received: AtomicU64,
    /// Requests parked in the queue (including requeues from the immediate path)
    pub queued: AtomicU64,
    /// Results delivered to relay clients
    pub delivered: AtomicU64,
    /// Error responses delivered to relay clients
    pub errored: AtomicU64,
    /// Requests dropped after a timeout or lost connection
    pub dropped: AtomicU64,
    /// Answers whose relay connection was already closed
    pub undeliverable: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub queued: u64,
    pub delivered: u64,
    pub errored: u64,
    pub dropped: u64,
    pub undeliverable: u64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            undeliverable: self.undeliverable.load(Ordering::Relaxed),
        }
    }
}

struct ActiveRelay {
    peer: Arc<RelayPeer>,
    reader: JoinHandle<()>,
}

impl ActiveRelay {
    fn shutdown(self) {
        self.peer.close();
        self.reader.abort();
    }
}

pub struct RelaySet {
    connector: Arc<dyn RelayConnector>,
    primary: Arc<PrimaryConnection>,
    queue: Arc<RelayQueue>,
    active: Mutex<HashMap<String, ActiveRelay>>,
    failed: Mutex<BTreeSet<String>>,
    desired: Mutex<BTreeSet<String>>,
    stats: RelayStats,
}

impl RelaySet {
    pub fn new(connector: Arc<dyn RelayConnector>, primary: Arc<PrimaryConnection>) -> Self {
        Self {
            connector,
            primary,
            queue: Arc::new(RelayQueue::new()),
            active: Mutex::new(HashMap::new()),
            failed: Mutex::new(BTreeSet::new()),
            desired: Mutex::new(BTreeSet::new()),
            stats: RelayStats::default(),
        }
    }

    pub fn primary(&self) -> &Arc<PrimaryConnection> {
        &self.primary
    }

    pub fn queue(&self) -> &Arc<RelayQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Connected addresses, sorted.
    pub fn active_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.active.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Addresses waiting for a reconnect attempt, sorted.
    pub fn failed_addresses(&self) -> Vec<String> {
        self.failed.lock().iter().cloned().collect()
    }

    /// Connect to `address` and keep it connected.
    ///
    /// A failed attempt is recorded for retry; it is not an error.
    pub async fn add_relay(self: &Arc<Self>, address: &str) {
        let address = normalize_relay_address(address);
        self.desired.lock().insert(address.clone());
        self.connect_relay(address).await;
    }

    /// Make the set of relay connections match `desired`.
    ///
    /// Connects untracked addresses, closes connections no longer wanted and
    /// forgets failed addresses no longer wanted. Calling it twice with the
    /// same list does nothing the second time.
    pub async fn sync_relay_connections(self: &Arc<Self>, desired: &[String]) {
        let desired: BTreeSet<String> = desired
            .iter()
            .map(|address| normalize_relay_address(address))
            .collect();
        *self.desired.lock() = desired.clone();

        let stale: Vec<(String, ActiveRelay)> = {
            let mut active = self.active.lock();
            let gone: Vec<String> = active
                .keys()
                .filter(|address| !desired.contains(*address))
                .cloned()
                .collect();
            gone.into_iter()
                .filter_map(|address| active.remove(&address).map(|relay| (address, relay)))
                .collect()
        };
        for (address, relay) in stale {
            info!(address = %address, "Relay no longer configured, closing");
            relay.shutdown();
        }

        let untracked: Vec<String> = {
            let mut failed = self.failed.lock();
            failed.retain(|address| desired.contains(address));
            let active = self.active.lock();
            desired
                .iter()
                .filter(|address| !active.contains_key(*address) && !failed.contains(*address))
                .cloned()
                .collect()
        };

        join_all(untracked.into_iter().map(|address| self.connect_relay(address))).await;
    }

    /// Try every failed address once more.
    pub async fn retry_failed(self: &Arc<Self>) {
        let failed = self.failed_addresses();
        if failed.is_empty() {
            return;
        }
        debug!(count = failed.len(), "Retrying failed relays");
        join_all(failed.into_iter().map(|address| self.connect_relay(address))).await;
    }

    /// Stop using `address` and close its connection, if any.
    pub fn close_relay(&self, address: &str) {
        let address = normalize_relay_address(address);
        self.desired.lock().remove(&address);
        self.failed.lock().remove(&address);
        let relay = self.active.lock().remove(&address);
        if let Some(relay) = relay {
            info!(address = %address, "Closing relay");
            relay.shutdown();
        }
    }

    /// Close every relay connection and forget all addresses.
    pub fn close_all(&self) {
        self.desired.lock().clear();
        self.failed.lock().clear();
        let relays: Vec<ActiveRelay> = self.active.lock().drain().map(|(_, relay)| relay).collect();
        for relay in relays {
            relay.shutdown();
        }
    }

    async fn connect_relay(self: &Arc<Self>, address: String) -> bool {
        if self.active.lock().contains_key(&address) {
            return true;
        }

        let link = match self.connector.connect(&address).await {
            Ok(link) => link,
            Err(e) => {
                if self.desired.lock().contains(&address) {
                    warn!(address = %address, error = %e, "Failed to connect to relay, will retry");
                    self.failed.lock().insert(address);
                }
                return false;
            }
        };

        self.failed.lock().remove(&address);
        if !self.desired.lock().contains(&address) {
            debug!(address = %address, "Relay removed while connecting, dropping connection");
            return false;
        }

        let SocketLink { outbound, inbound } = link;
        let peer = Arc::new(RelayPeer::new(address.clone(), outbound));
        {
            let mut active = self.active.lock();
            if active.contains_key(&address) {
                // Lost a race with another attempt for the same address
                peer.close();
                return true;
            }
            let reader = self.spawn_reader(Arc::clone(&peer), inbound);
            active.insert(address.clone(), ActiveRelay { peer: Arc::clone(&peer), reader });
        }

        info!(address = %address, connection = %peer.id(), "Relay connected");
        true
    }

    fn spawn_reader(
        self: &Arc<Self>,
        peer: Arc<RelayPeer>,
        mut inbound: mpsc::Receiver<String>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(text) = inbound.recv().await {
                this.handle_relay_message(&peer, &text).await;
            }
            this.on_relay_closed(&peer);
        })
    }

    /// Rewrite one inbound frame and either queue it or start forwarding it.
    async fn handle_relay_message(self: &Arc<Self>, peer: &Arc<RelayPeer>, text: &str) {
        let request = match Message::parse(text) {
            Ok(Message::Request(request)) => request,
            Ok(Message::Response(response)) => {
                debug!(address = %peer.address(), id = %response.id, "Dropping response sent by relay");
                return;
            }
            Err(e) => {
                warn!(address = %peer.address(), error = %e, "Dropping malformed message from relay");
                return;
            }
        };

        let original_id = request.id.clone();
        let local_id = self.primary.ids().next_id();
        let entry = RelayQueueEntry {
            request: request.with_id(local_id),
            origin: Arc::clone(peer),
            original_id,
        };
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        debug!(
            address = %peer.address(),
            original_id = %entry.original_id,
            request_id = local_id,
            method = %entry.request.method,
            "Relaying request"
        );

        if !self.primary.is_connected() {
            self.enqueue(entry);
            return;
        }

        // Transmit inline so requests from one relay reach the primary in
        // arrival order; only the wait for the answer runs in the background.
        match self.dispatch(entry).await {
            Dispatch::Sent(entry, in_flight) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = this.finish(entry, in_flight).await;
                    this.after_immediate(outcome);
                });
            }
            Dispatch::Settled(outcome) => self.after_immediate(outcome),
        }
    }

    fn after_immediate(&self, outcome: ForwardOutcome) {
        match outcome {
            ForwardOutcome::Unavailable(entry) => self.enqueue(entry),
            ForwardOutcome::ConnectionLost(entry) => {
                warn!(
                    request_id = ?entry.local_id(),
                    method = %entry.request.method,
                    "Primary disconnected before answering relayed request"
                );
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Hand the entry's request to the primary without waiting for the answer.
    ///
    /// Entries that could still be delivered later come back in the outcome;
    /// the caller decides whether to queue them.
    pub(crate) async fn dispatch(&self, entry: RelayQueueEntry) -> Dispatch {
        match self.primary.transmit(entry.request.clone()).await {
            Ok(Some(in_flight)) => Dispatch::Sent(entry, in_flight),
            Ok(None) => Dispatch::Settled(ForwardOutcome::Unavailable(entry)),
            Err(e) => Dispatch::Settled(self.settle(entry, Err(e)).await),
        }
    }

    /// Wait for the answer to a dispatched entry and pass it on.
    pub(crate) async fn finish(&self, entry: RelayQueueEntry, in_flight: InFlight) -> ForwardOutcome {
        let request_id = in_flight.id();
        let answer = in_flight.response().await;
        debug!(request_id, ok = answer.is_ok(), "Relayed request settled");
        self.settle(entry, answer).await
    }

    async fn settle(&self, entry: RelayQueueEntry, answer: RemoteResult<Value>) -> ForwardOutcome {
        match answer {
            Ok(result) => {
                let text = json_rpc_result(&entry.original_id, result);
                if self.reply(&entry, text).await {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                ForwardOutcome::Delivered
            }
            Err(e) if e.kind.is_application() => {
                let text = json_rpc_error(&entry.original_id, &e.message);
                if self.reply(&entry, text).await {
                    self.stats.errored.fetch_add(1, Ordering::Relaxed);
                }
                ForwardOutcome::Rejected
            }
            Err(e) if e.kind == RpcErrorKind::ResponseTimeout => {
                warn!(
                    request_id = ?entry.local_id(),
                    method = %entry.request.method,
                    error = %e,
                    "Relayed request timed out, dropping"
                );
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                ForwardOutcome::TimedOut
            }
            Err(_) => ForwardOutcome::ConnectionLost(entry),
        }
    }

    fn enqueue(&self, entry: RelayQueueEntry) {
        debug!(request_id = ?entry.local_id(), "No primary connected, queueing relayed request");
        self.queue.push(entry);
        self.stats.queued.fetch_add(1, Ordering::Relaxed);
    }

    async fn reply(&self, entry: &RelayQueueEntry, text: String) -> bool {
        if entry.origin.deliver(text).await {
            return true;
        }
        warn!(
            address = %entry.origin.address(),
            original_id = %entry.original_id,
            "Relay connection closed before its response arrived, discarding"
        );
        self.stats.undeliverable.fetch_add(1, Ordering::Relaxed);
        false
    }

    fn on_relay_closed(&self, peer: &Arc<RelayPeer>) {
        peer.mark_dead();

        let removed = {
            let mut active = self.active.lock();
            match active.get(peer.address()) {
                Some(relay) if relay.peer.id() == peer.id() => active.remove(peer.address()),
                _ => None,
            }
        };
        if removed.is_none() {
            return;
        }

        let address = peer.address().to_owned();
        if self.desired.lock().contains(&address) {
            info!(address = %address, "Relay disconnected, will reconnect");
            self.failed.lock().insert(address);
        } else {
            info!(address = %address, "Relay disconnected");
        }
    }
}
