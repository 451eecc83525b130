//! JSON-RPC 2.0 shaped wire messages.
//!
//! A frame is either a request (has `method`) or a response (has `result` or
//! `error`). Anything without `jsonrpc: "2.0"` or with a non-numeric `id` is
//! invalid and gets dropped by whoever reads it.

use serde_json::{Map, Number, Value};

/// Protocol-version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Identifier, echoed back in the matching response
    pub id: Number,
    /// Method name (opaque to the relay)
    pub method: String,
    /// Parameters payload (opaque to the relay)
    pub params: Value,
}

impl Request {
    /// Create a request with a locally allocated id.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Number::from(id),
            method: method.into(),
            params,
        }
    }

    /// Same request under a different id.
    pub fn with_id(self, id: u64) -> Self {
        Self {
            id: Number::from(id),
            ..self
        }
    }

    /// Serialize to a wire frame.
    pub fn to_text(&self) -> String {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": self.id,
            "method": self.method,
            "params": self.params,
        })
        .to_string()
    }
}

/// A response frame.
///
/// `result` is `None` when the field is missing or explicitly `null`; the
/// primary connection treats that as a failed call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: Number,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// A parsed, validated frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// Why a frame was rejected.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("missing or unsupported jsonrpc version")]
    BadVersion,
    #[error("missing or non-numeric id")]
    BadId,
    #[error("method must be a string")]
    BadMethod,
    #[error("message carries both a method and a result or error")]
    Ambiguous,
}

impl Message {
    /// Parse and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let Value::Object(mut object) = serde_json::from_str::<Value>(text)? else {
            return Err(MessageError::NotAnObject);
        };

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(MessageError::BadVersion);
        }

        let id = match object.remove("id") {
            Some(Value::Number(id)) => id,
            _ => return Err(MessageError::BadId),
        };

        match object.remove("method") {
            Some(Value::String(method)) => {
                if present(&object, "result") || present(&object, "error") {
                    return Err(MessageError::Ambiguous);
                }
                let params = object.remove("params").unwrap_or(Value::Null);
                Ok(Message::Request(Request { id, method, params }))
            }
            Some(_) => Err(MessageError::BadMethod),
            None => {
                let error = object
                    .remove("error")
                    .filter(|e| !e.is_null())
                    .map(error_text);
                let result = object.remove("result").filter(|r| !r.is_null());
                Ok(Message::Response(Response { id, result, error }))
            }
        }
    }
}

fn present(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).is_some_and(|v| !v.is_null())
}

/// Error descriptions are strings on the wire; tolerate `{ message }` objects.
fn error_text(error: Value) -> String {
    match error {
        Value::String(s) => s,
        Value::Object(ref object) => match object.get("message").and_then(Value::as_str) {
            Some(message) => message.to_owned(),
            None => error.to_string(),
        },
        other => other.to_string(),
    }
}

/// Create a success response frame
pub fn json_rpc_result(id: &Number, result: Value) -> String {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result
    })
    .to_string()
}

/// Create an error response frame
pub fn json_rpc_error(id: &Number, message: &str) -> String {
    serde_json::json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": message
    })
    .to_string()
}
