//! Typed results of the remote calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A file and its content, as returned by `getFiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub filename: String,
    pub content: String,
}

/// A server the primary knows about.
///
/// Fields beyond the three the relay cares about are kept in `extra` and
/// serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub hostname: String,
    #[serde(default)]
    pub has_admin_rights: bool,
    #[serde(default)]
    pub purchased_by_player: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// File timestamps. Kept as the strings the primary sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub atime: String,
    pub btime: String,
    pub mtime: String,
}

/// Save data export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFile {
    pub identifier: String,
    /// Whether `save` is base64 of a binary save
    pub binary: bool,
    pub save: String,
}
