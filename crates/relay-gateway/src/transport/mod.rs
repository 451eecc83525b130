//! Sockets: the in-process link abstraction, the outbound relay connectors
//! and the primary listener.

pub mod connector;
pub mod link;
pub mod listener;
pub mod memory;

pub use connector::{RelayConnector, WsConnector};
pub use link::{LinkPeer, SocketLink};
pub use listener::{ListenerOptions, PrimaryListener};
pub use memory::MemoryConnector;
