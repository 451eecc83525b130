// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Relay Gateway - one primary JSON-RPC endpoint, many relay clients.
//!
//! The primary endpoint connects in over WebSocket; relay clients are reached
//! over outbound WebSocket connections. Requests from relay clients are
//! rewritten under locally unique ids, forwarded to the primary, and the
//! answers routed back under the ids the clients used.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          RELAY GATEWAY                                │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐                      ┌──────────────────────┐  │
//! │  │ Primary Listener │  ws://host:12525/    │   Relay Connection   │  │
//! │  │ (/, /health,     │◄──── primary         │        Set           │──┼──► relay clients
//! │  │  /status)        │                      │  (outbound sockets)  │  │
//! │  └────────┬─────────┘                      └──────────┬───────────┘  │
//! │           │                                           │              │
//! │  ┌────────┴────────────────────────┐     id rewrite   │              │
//! │  │   Primary Connection Manager    │◄─────────────────┤              │
//! │  │ (one active socket, generations)│                  │              │
//! │  └────────┬────────────────────────┘        ┌─────────┴──────────┐   │
//! │           │                                 │    Relay Queue     │   │
//! │  ┌────────┴────────────────────────┐        │ (primary absent)   │   │
//! │  │      Pending-Request Table      │        └─────────┬──────────┘   │
//! │  │   (oneshot per in-flight id)    │                  │              │
//! │  └─────────────────────────────────┘        ┌─────────┴──────────┐   │
//! │                                             │   Requeue Loop     │   │
//! │  ┌─────────────────────────────────┐        │ (retry + redrive)  │   │
//! │  │  RPC Facade (RemoteApi)         │        └────────────────────┘   │
//! │  └─────────────────────────────────┘                                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use relay_gateway::{RelayConfig, RelayService};
//!
//! let mut service = RelayService::with_default_connector(RelayConfig::default())?;
//! service.start().await?;
//! let names = service.api().get_file_names("home").await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod primary;
pub mod relay;
pub mod rpc;
pub mod service;
pub mod status;
pub mod transport;

// Re-exports for public API
pub use domain::config::RelayConfig;
pub use domain::error::{GatewayError, RemoteError, RemoteResult, RpcErrorKind};
pub use primary::{InFlight, PrimaryConnection, PrimaryEvent};
pub use relay::RelaySet;
pub use rpc::RemoteApi;
pub use service::RelayService;
pub use status::RelayStatus;
pub use transport::connector::{RelayConnector, WsConnector};
pub use transport::memory::MemoryConnector;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
