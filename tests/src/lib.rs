//! # Relay Test Suite
//!
//! Cross-component scenarios for the relay gateway.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs          # Fake primary, fake relay clients, service setup
//! └── integration/
//!     ├── brief_drop.rs     # Primary drops and returns while relays keep sending
//!     ├── correlation.rs    # Id rewriting, exactly-once delivery, facade calls
//!     ├── reconnect.rs      # Primary replacement, relay reconciliation
//!     └── websocket_e2e.rs  # Real sockets on both sides
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p relay-tests
//!
//! # By category
//! cargo test -p relay-tests integration::brief_drop::
//! cargo test -p relay-tests integration::websocket_e2e::
//! ```

pub mod fixtures;
