//! JSON-RPC 2.0 envelopes and file URIs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

pub(crate) const JSONRPC_VERSION: &str = "2.0";

pub(crate) const INVALID_REQUEST: i64 = -32600;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const SERVER_NOT_INITIALIZED: i64 = -32002;
pub(crate) const REQUEST_FAILED: i64 = -32803;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub(crate) struct PathToUriError {
    path: PathBuf,
}

/// An outgoing request. Ids are only ever allocated by the proxy, which
/// numbers them sequentially.
#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(err: &serde_json::Error) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {err}"))
    }
}

/// A response frame. A successful `null` result is still written out as
/// `"result": null`.
pub(crate) fn response(id: Value, result: Result<Value, ResponseError>) -> Value {
    match result {
        Ok(result) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error }),
    }
}

pub(crate) fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params })
}

/// A decoded incoming frame.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// A reply to one of our requests. Replies with non-numeric ids cannot
    /// belong to us and come back with `id: None`.
    Response {
        id: Option<u64>,
        result: Result<Value, ResponseError>,
    },
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

/// Classify a frame by which envelope fields it carries. `None` for frames
/// that are neither a request, a notification, nor a response.
pub(crate) fn classify(mut frame: Value) -> Option<Incoming> {
    let object = frame.as_object_mut()?;
    let id = object.remove("id");
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(String::from);
    let params = object.remove("params").unwrap_or(Value::Null);

    match (id, method) {
        (Some(id), Some(method)) => Some(Incoming::Request { id, method, params }),
        (None, Some(method)) => Some(Incoming::Notification { method, params }),
        (Some(id), None) => {
            let result = if let Some(error) = object.remove("error") {
                let error = serde_json::from_value(error).unwrap_or_else(|_| {
                    ResponseError::new(REQUEST_FAILED, "malformed error response")
                });
                Err(error)
            } else {
                Ok(object.remove("result")?)
            };
            Some(Incoming::Response {
                id: id.as_u64(),
                result,
            })
        }
        (None, None) => None,
    }
}

pub(crate) fn path_to_uri(path: &Path) -> Result<Url, PathToUriError> {
    Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// The local path of a `file:` URI; `None` for other schemes.
pub(crate) fn uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok().and_then(|url| url.to_file_path().ok())
}
