//! RPC Facade.
//!
//! Named calls over [`PrimaryConnection::send`]. Every call returns
//! `Ok(None)` when no primary is connected, so callers can tell "try later"
//! apart from a remote failure.

pub mod methods;
pub mod types;

pub use types::{FileMetadata, RemoteFile, SaveFile, ServerInfo};

use crate::domain::error::{RemoteError, RemoteResult, RpcErrorKind};
use crate::primary::PrimaryConnection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// RAM cost reported when the primary could not compute one.
pub const RAM_NOT_CALCULATED: f64 = -1.0;

#[derive(Clone)]
pub struct RemoteApi {
    primary: Arc<PrimaryConnection>,
}

impl RemoteApi {
    pub fn new(primary: Arc<PrimaryConnection>) -> Self {
        Self { primary }
    }

    /// Send `method` and decode the result as `T`.
    ///
    /// A result that does not decode is reported as `Failed`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> RemoteResult<Option<T>> {
        let Some(result) = self.primary.send(method, params).await? else {
            return Ok(None);
        };
        serde_json::from_value(result).map(Some).map_err(|e| {
            debug!(method = method, error = %e, "Unexpected result shape");
            RemoteError::failed(format!("unexpected result for {method}: {e}"))
        })
    }

    /// Write a file on a server. False if no primary is connected.
    pub async fn push_file(&self, filename: &str, content: &str, server: &str) -> RemoteResult<bool> {
        self.acknowledged(
            methods::PUSH_FILE,
            json!({"filename": filename, "content": content, "server": server}),
        )
        .await
    }

    pub async fn get_file(&self, filename: &str, server: &str) -> RemoteResult<Option<String>> {
        self.call(methods::GET_FILE, json!({"filename": filename, "server": server}))
            .await
    }

    pub async fn get_file_metadata(&self, filename: &str, server: &str) -> RemoteResult<Option<FileMetadata>> {
        self.call(
            methods::GET_FILE_METADATA,
            json!({"filename": filename, "server": server}),
        )
        .await
    }

    /// Delete a file on a server. False if no primary is connected.
    pub async fn delete_file(&self, filename: &str, server: &str) -> RemoteResult<bool> {
        self.acknowledged(
            methods::DELETE_FILE,
            json!({"filename": filename, "server": server}),
        )
        .await
    }

    /// File names on `server`; `None` also when the hostname is unknown.
    pub async fn get_file_names(&self, server: &str) -> RemoteResult<Option<Vec<String>>> {
        hostname_optional(self.call(methods::GET_FILE_NAMES, json!({"server": server})).await)
    }

    pub async fn get_definition_file(&self) -> RemoteResult<Option<String>> {
        self.call(methods::GET_DEFINITION_FILE, json!({})).await
    }

    /// Every file on `server`; `None` also when the hostname is unknown.
    pub async fn get_all_files(&self, server: &str) -> RemoteResult<Option<Vec<RemoteFile>>> {
        hostname_optional(self.call(methods::GET_ALL_FILES, json!({"server": server})).await)
    }

    /// Metadata for every file on `server`; `None` also when the hostname is unknown.
    pub async fn get_all_file_metadata(&self, server: &str) -> RemoteResult<Option<Vec<FileMetadata>>> {
        hostname_optional(
            self.call(methods::GET_ALL_FILE_METADATA, json!({"server": server}))
                .await,
        )
    }

    /// RAM cost of a script, or [`RAM_NOT_CALCULATED`] when the primary
    /// cannot compute it.
    pub async fn calculate_ram(&self, filename: &str, server: &str) -> RemoteResult<Option<f64>> {
        match self
            .call(methods::CALCULATE_RAM, json!({"filename": filename, "server": server}))
            .await
        {
            Err(e) if e.kind == RpcErrorKind::RamNotCalculated => Ok(Some(RAM_NOT_CALCULATED)),
            other => other,
        }
    }

    pub async fn get_all_servers(&self) -> RemoteResult<Option<Vec<ServerInfo>>> {
        self.call(methods::GET_ALL_SERVERS, json!({})).await
    }

    pub async fn get_save_file(&self) -> RemoteResult<Option<SaveFile>> {
        self.call(methods::GET_SAVE_FILE, json!({})).await
    }

    async fn acknowledged(&self, method: &str, params: Value) -> RemoteResult<bool> {
        match self.call::<String>(method, params).await? {
            None => Ok(false),
            Some(ack) if ack == methods::ACK => Ok(true),
            Some(other) => Err(RemoteError::failed(format!(
                "unexpected acknowledgement for {method}: {other}"
            ))),
        }
    }
}

fn hostname_optional<T>(result: RemoteResult<Option<T>>) -> RemoteResult<Option<T>> {
    match result {
        Err(e) if e.kind == RpcErrorKind::InvalidHostname => Ok(None),
        other => other,
    }
}
