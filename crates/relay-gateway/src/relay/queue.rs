//! Relayed requests waiting for a primary.

use crate::domain::message::Request;
use crate::relay::peer::RelayPeer;
use parking_lot::Mutex;
use serde_json::Number;
use std::collections::VecDeque;
use std::sync::Arc;

/// A relay client's request, rewritten under a local id.
#[derive(Debug, Clone)]
pub struct RelayQueueEntry {
    /// The request as it goes to the primary
    pub request: Request,
    /// Connection the response goes back to
    pub origin: Arc<RelayPeer>,
    /// Id the relay client used
    pub original_id: Number,
}

impl RelayQueueEntry {
    pub fn local_id(&self) -> Option<u64> {
        self.request.id.as_u64()
    }
}

/// FIFO of entries that could not be forwarded yet.
#[derive(Debug, Default)]
pub struct RelayQueue {
    entries: Mutex<VecDeque<RelayQueueEntry>>,
}

impl RelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: RelayQueueEntry) {
        self.entries.lock().push_back(entry);
    }

    /// Take every entry, leaving the queue empty.
    pub fn drain(&self) -> Vec<RelayQueueEntry> {
        self.entries.lock().drain(..).collect()
    }

    /// Put entries back behind anything queued since the last drain.
    pub fn requeue(&self, entries: impl IntoIterator<Item = RelayQueueEntry>) {
        self.entries.lock().extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
