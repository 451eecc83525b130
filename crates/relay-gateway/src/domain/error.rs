//! Error taxonomy for remote calls and gateway-level failures.
//!
//! The primary endpoint reports failures as bare strings. Those are mapped
//! onto [`RpcErrorKind`] by exact phrase lookup; anything unrecognised is
//! [`RpcErrorKind::Failed`]. Callers match on the kind, never on the text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Kind of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcErrorKind {
    /// Generic or unclassified failure
    Failed,
    /// Method not recognised by the primary
    UnknownMessage,
    MissingParameters,
    /// Malformed path
    InvalidFile,
    InvalidFileExtension,
    InvalidHostname,
    FileNotFound,
    /// Cost computation failed because the source does not compile
    RamNotCalculated,
    /// No response within the configured window
    ResponseTimeout,
    /// The primary went away (or was replaced) while the request was in flight
    Disconnected,
}

impl RpcErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "Failed",
            Self::UnknownMessage => "UnknownMessage",
            Self::MissingParameters => "MissingParameters",
            Self::InvalidFile => "InvalidFile",
            Self::InvalidFileExtension => "InvalidFileExtension",
            Self::InvalidHostname => "InvalidHostname",
            Self::FileNotFound => "FileNotFound",
            Self::RamNotCalculated => "RamNotCalculated",
            Self::ResponseTimeout => "ResponseTimeout",
            Self::Disconnected => "Disconnected",
        }
    }

    /// True when the primary itself answered with this error, as opposed to
    /// the transport failing underneath the call.
    pub fn is_application(&self) -> bool {
        !matches!(self, Self::ResponseTimeout | Self::Disconnected)
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phrases the primary endpoint is known to answer with.
pub const KNOWN_PHRASES: &[(&str, RpcErrorKind)] = &[
    ("Unknown message", RpcErrorKind::UnknownMessage),
    ("Unknown method", RpcErrorKind::UnknownMessage),
    ("Misses parameters", RpcErrorKind::MissingParameters),
    ("Message misses parameters", RpcErrorKind::MissingParameters),
    ("Missing parameters", RpcErrorKind::MissingParameters),
    ("Invalid file", RpcErrorKind::InvalidFile),
    ("Invalid filename", RpcErrorKind::InvalidFile),
    ("Invalid file extension", RpcErrorKind::InvalidFileExtension),
    ("Invalid hostname", RpcErrorKind::InvalidHostname),
    ("Server hostname invalid", RpcErrorKind::InvalidHostname),
    ("File doesn't exist", RpcErrorKind::FileNotFound),
    ("File not found", RpcErrorKind::FileNotFound),
    ("Ram cost could not be calculated", RpcErrorKind::RamNotCalculated),
];

/// Exact-match phrase table, extensible at runtime.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    phrases: HashMap<String, RpcErrorKind>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            phrases: KNOWN_PHRASES
                .iter()
                .map(|(phrase, kind)| ((*phrase).to_owned(), *kind))
                .collect(),
        }
    }
}

impl ErrorClassifier {
    /// Add (or override) a phrase.
    pub fn with_phrase(mut self, phrase: impl Into<String>, kind: RpcErrorKind) -> Self {
        self.phrases.insert(phrase.into(), kind);
        self
    }

    pub fn extend<I, S>(&mut self, phrases: I)
    where
        I: IntoIterator<Item = (S, RpcErrorKind)>,
        S: Into<String>,
    {
        self.phrases
            .extend(phrases.into_iter().map(|(phrase, kind)| (phrase.into(), kind)));
    }

    /// Map an error string from the primary onto a kind.
    pub fn classify(&self, message: &str) -> RpcErrorKind {
        self.phrases
            .get(message)
            .copied()
            .unwrap_or(RpcErrorKind::Failed)
    }
}

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RpcErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Failed, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            RpcErrorKind::ResponseTimeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Disconnected, reason)
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures connecting out to a relay.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("connection to {0} timed out")]
    ConnectTimeout(String),
}

/// Gateway-level errors (service lifecycle, not JSON-RPC)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Listener socket bind error
    #[error("failed to bind primary listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` called twice
    #[error("service already started")]
    AlreadyStarted,

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,
}
