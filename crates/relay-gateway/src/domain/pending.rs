//! Pending-Request Table.
//!
//! Maps an in-flight request id to the oneshot channel its caller is waiting
//! on. Every entry leaves the table exactly once: on a matching response, on
//! timeout, or when the primary connection it was sent on goes away.

use crate::domain::error::RemoteError;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outcome delivered to a waiting caller.
pub type Resolution = Result<serde_json::Value, RemoteError>;

/// A request waiting for its response
struct PendingRequest {
    /// Channel to resolve the caller
    sender: oneshot::Sender<Resolution>,
    /// When request was registered
    created_at: Instant,
    /// When the request expires
    deadline: Instant,
    /// Method name (for logging)
    method: String,
    /// Primary connection generation the request was sent on
    generation: u64,
}

/// Statistics for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests fulfilled with a result
    pub total_completed: AtomicU64,
    /// Total requests rejected with an error (remote or disconnect)
    pub total_rejected: AtomicU64,
    /// Total requests that timed out
    pub total_timeouts: AtomicU64,
    /// Total requests withdrawn before transmission or whose caller was gone
    pub total_cancelled: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub cancelled: u64,
}

impl PendingStats {
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            rejected: self.total_rejected.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Pending-Request Table.
///
/// Flow:
/// 1. Sender allocates an id and calls `register()` to get a oneshot receiver
/// 2. Sender transmits the request to the primary
/// 3. Inbound dispatch calls `resolve()` with the matching response
/// 4. Sender awaits the receiver, calling `expire()` if its timeout fires first
pub struct PendingRequestTable {
    /// Map of request id to pending request
    pending: DashMap<u64, PendingRequest>,
    /// Statistics
    stats: Arc<PendingStats>,
}

impl Default for PendingRequestTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a pending request and get a receiver for its resolution.
    pub fn register(
        &self,
        id: u64,
        method: &str,
        generation: u64,
        timeout: Duration,
    ) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();

        let request = PendingRequest {
            sender: tx,
            created_at: now,
            deadline: now + timeout,
            method: method.to_string(),
            generation,
        };

        if let Some(previous) = self.pending.insert(id, request) {
            // Ids come from one allocator; a collision means a caller reused one.
            warn!(request_id = id, method = previous.method, "Replaced pending request with same id");
            let _ = previous
                .sender
                .send(Err(RemoteError::failed("request id reused")));
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(request_id = id, method = method, generation, "Registered pending request");

        rx
    }

    /// Resolve a pending request.
    ///
    /// Returns true if the request was found and its caller received the
    /// outcome, false if the id is unknown or the caller already gave up.
    pub fn resolve(&self, id: u64, resolution: Resolution) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            debug!(request_id = id, "Response for unknown or expired request id");
            return false;
        };

        let succeeded = resolution.is_ok();
        let elapsed_ms = pending.created_at.elapsed().as_millis();
        match pending.sender.send(resolution) {
            Ok(()) => {
                let counter = if succeeded {
                    &self.stats.total_completed
                } else {
                    &self.stats.total_rejected
                };
                counter.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = id,
                    method = pending.method,
                    response_time_ms = elapsed_ms,
                    succeeded,
                    "Resolved pending request"
                );
                true
            }
            Err(_) => {
                // Receiver was dropped (caller gone)
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(request_id = id, method = pending.method, "Pending request receiver dropped");
                false
            }
        }
    }

    /// Remove a request whose caller timed out. The caller reports the
    /// timeout itself; nothing is sent on the channel.
    pub fn expire(&self, id: u64) -> bool {
        if let Some((_, pending)) = self.pending.remove(&id) {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                request_id = id,
                method = pending.method,
                elapsed_ms = pending.created_at.elapsed().as_millis(),
                "Request timed out"
            );
            true
        } else {
            false
        }
    }

    /// Withdraw a request that was never transmitted.
    pub fn cancel(&self, id: u64) -> bool {
        if self.pending.remove(&id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Reject every request sent on one primary generation.
    ///
    /// Returns the number of requests rejected.
    pub fn reject_generation(&self, generation: u64, error: RemoteError) -> usize {
        let ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| entry.value().generation == generation)
            .map(|entry| *entry.key())
            .collect();
        self.reject_ids(ids, &error)
    }

    /// Reject every pending request.
    pub fn reject_all(&self, error: RemoteError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        self.reject_ids(ids, &error)
    }

    fn reject_ids(&self, ids: Vec<u64>, error: &RemoteError) -> usize {
        ids.into_iter()
            .filter(|id| self.pending.contains_key(id))
            .map(|id| self.resolve(id, Err(error.clone())))
            .filter(|delivered| *delivered)
            .count()
    }

    /// Reject requests past their deadline (leak guard for callers that
    /// stopped waiting without expiring their entry).
    ///
    /// Returns the number of requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(u64, Duration)> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| {
                let timeout = entry.value().deadline - entry.value().created_at;
                (*entry.key(), timeout)
            })
            .collect();

        let mut removed = 0;
        for (id, timeout) in expired {
            if let Some((_, pending)) = self.pending.remove(&id) {
                warn!(
                    request_id = id,
                    method = pending.method,
                    timeout_ms = timeout.as_millis(),
                    "Removing expired pending request"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                let _ = pending.sender.send(Err(RemoteError::timeout(timeout)));
                removed += 1;
            }
        }
        removed
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a request id is pending
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Background task to reject expired requests until shutdown is signalled.
pub async fn sweep_task(
    table: Arc<PendingRequestTable>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                let removed = table.remove_expired();
                if removed > 0 {
                    debug!(removed = removed, "Swept expired pending requests");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
