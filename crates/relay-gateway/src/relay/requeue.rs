//! Requeue Loop.
//!
//! Every tick: reconnect failed relays, then, if a primary is connected,
//! redrive everything that queued up while it was away.

use crate::relay::set::{Dispatch, ForwardOutcome, RelaySet};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Counts from one drain of the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub forwarded: usize,
    pub requeued: usize,
    pub dropped: usize,
}

pub struct RequeueLoop {
    relays: Arc<RelaySet>,
}

impl RequeueLoop {
    pub fn new(relays: Arc<RelaySet>) -> Self {
        Self { relays }
    }

    /// Run one reconciliation pass.
    pub async fn tick(&self) -> DrainReport {
        self.relays.retry_failed().await;

        let queue = self.relays.queue();
        if !self.relays.primary().is_connected() || queue.is_empty() {
            return DrainReport::default();
        }

        let entries = queue.drain();
        let mut report = DrainReport {
            forwarded: entries.len(),
            ..DrainReport::default()
        };
        debug!(count = entries.len(), "Redriving queued relay requests");

        // Transmit in queue order, then wait for all answers together.
        let mut outcomes: Vec<Option<ForwardOutcome>> = Vec::with_capacity(entries.len());
        let mut waiting = Vec::new();
        for entry in entries {
            match self.relays.dispatch(entry).await {
                Dispatch::Sent(entry, in_flight) => {
                    let slot = outcomes.len();
                    outcomes.push(None);
                    let relays = &self.relays;
                    waiting.push(async move { (slot, relays.finish(entry, in_flight).await) });
                }
                Dispatch::Settled(outcome) => outcomes.push(Some(outcome)),
            }
        }
        for (slot, outcome) in join_all(waiting).await {
            outcomes[slot] = Some(outcome);
        }

        let mut retry = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                ForwardOutcome::Unavailable(entry) | ForwardOutcome::ConnectionLost(entry) => {
                    retry.push(entry)
                }
                ForwardOutcome::TimedOut => report.dropped += 1,
                ForwardOutcome::Delivered | ForwardOutcome::Rejected => {}
            }
        }

        report.requeued = retry.len();
        if !retry.is_empty() {
            info!(count = retry.len(), "Primary unavailable during drain, requeueing");
            queue.requeue(retry);
        }
        report
    }

    /// Tick every `period` until `shutdown` flips to true. The first tick
    /// happens one period after the call.
    pub fn spawn(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Requeue loop stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}
