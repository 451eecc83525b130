//! Domain types for the relay gateway.
//!
//! Messages, identifiers, errors, configuration and the pending-request table.

pub mod config;
pub mod connection_id;
pub mod error;
pub mod ids;
pub mod message;
pub mod pending;

// Re-exports for convenience
pub use config::{ConfigError, RelayConfig};
pub use connection_id::ConnectionId;
pub use error::{ErrorClassifier, GatewayError, RemoteError, RemoteResult, RpcErrorKind, TransportError};
pub use ids::IdAllocator;
pub use message::{Message, Request, Response};
pub use pending::{PendingRequestTable, PendingStats, PendingStatsSnapshot};
