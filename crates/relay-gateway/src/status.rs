//! Point-in-time view of the relay, served at `/status`.

use crate::domain::pending::PendingStatsSnapshot;
use crate::relay::{RelaySet, RelayStatsSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub primary_connected: bool,
    /// Generation of the active primary socket
    pub generation: Option<u64>,
    pub listen_addr: Option<SocketAddr>,
    pub started_at: DateTime<Utc>,
    /// Requests waiting on the primary
    pub pending: usize,
    /// Relayed requests waiting for a primary
    pub queued: usize,
    pub active_relays: Vec<String>,
    pub failed_relays: Vec<String>,
    pub pending_stats: PendingStatsSnapshot,
    pub relay_stats: RelayStatsSnapshot,
}

impl RelayStatus {
    pub fn collect(relays: &RelaySet, listen_addr: Option<SocketAddr>, started_at: DateTime<Utc>) -> Self {
        let primary = relays.primary();
        Self {
            primary_connected: primary.is_connected(),
            generation: primary.generation(),
            listen_addr,
            started_at,
            pending: primary.pending().pending_count(),
            queued: relays.queue().len(),
            active_relays: relays.active_addresses(),
            failed_relays: relays.failed_addresses(),
            pending_stats: primary.pending().stats().snapshot(),
            relay_stats: relays.stats().snapshot(),
        }
    }
}
