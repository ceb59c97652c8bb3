//! JSON-RPC 2.0 frame types and the RPC error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON-RPC error code for an unknown method, per the 2.0 spec.
const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Clone, Debug, Error)]
pub enum RpcError {
    /// Socket-level failure: connect, read, write, or connection closed.
    #[error("rpc transport error: {0}")]
    Transport(String),
    /// The caller-supplied timeout elapsed before a response arrived.
    #[error("rpc timed out")]
    Timeout,
    /// The server sent a frame we could not interpret.
    #[error("malformed rpc frame: {0}")]
    Malformed(String),
    /// The server does not implement the requested method.
    #[error("rpc method unsupported: {0}")]
    MethodUnsupported(String),
    /// Any other error object returned by the server.
    #[error("rpc error {code}: {message}")]
    Remote { code: i64, message: String },
}

/// An outgoing request frame.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u32,
    pub method: &'a str,
    pub params: serde_json::Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u32, method: &'a str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// The error object of a response frame.
#[derive(Debug, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

impl ErrorObject {
    pub fn into_rpc_error(self, method_hint: &str) -> RpcError {
        if self.code == METHOD_NOT_FOUND {
            RpcError::MethodUnsupported(method_hint.to_owned())
        } else {
            RpcError::Remote {
                code: self.code,
                message: self.message,
            }
        }
    }
}

/// An incoming frame: either a response (has `id`) or a notification
/// (no `id`, has `method`).
#[derive(Debug, Deserialize)]
pub struct Frame {
    pub id: Option<u32>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub result: serde_json::Value,
    pub error: Option<ErrorObject>,
}

/// A server-pushed notification.
#[derive(Clone, Debug)]
pub struct Notification {
    pub method: String,
    pub params: serde_json::Value,
}
