//! Relay clients: outbound connections, their queued requests, and the loop
//! that redrives them.

pub mod peer;
pub mod queue;
pub mod requeue;
pub mod set;

pub use peer::RelayPeer;
pub use queue::{RelayQueue, RelayQueueEntry};
pub use requeue::{DrainReport, RequeueLoop};
pub use set::{ForwardOutcome, RelaySet, RelayStats, RelayStatsSnapshot};
