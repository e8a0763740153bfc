//! JSON-RPC 2.0 message shapes and standard error codes.
//!
//! Messages are discriminated by shape, not by a type tag:
//!
//! | Shape                      | Variant                          |
//! |----------------------------|----------------------------------|
//! | `{method, id}`             | [`JsonRpcMessage::Request`]      |
//! | `{method}` (no `id`)       | [`JsonRpcMessage::Notification`] |
//! | `{id, result}` XOR `{id, error}` | [`JsonRpcMessage::Response`] |
//!
//! Anything else is rejected: invalid JSON maps to `PARSE_ERROR`, valid JSON
//! of the wrong shape to `INVALID_REQUEST`. A request `id` identifies exactly
//! one eventual response; notifications never receive one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version emitted in every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Request correlation identifier: a JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id (the allocator in this crate always produces these).
    Number(i64),
    /// String id, accepted from remotes that allocate them.
    Text(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC error payload carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code (see [`codes`]).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error payload with no structured detail.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `METHOD_NOT_FOUND` payload naming the unknown method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// `INVALID_PARAMS` payload.
    #[must_use]
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, detail)
    }

    /// `INVALID_REQUEST` payload.
    #[must_use]
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, detail)
    }

    /// `PARSE_ERROR` payload.
    #[must_use]
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, detail)
    }

    /// `INTERNAL_ERROR` payload.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, detail)
    }
}

/// An outbound call expecting exactly one response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Correlation id, unique within the owning session.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters, omitted from the wire when `None`.
    pub params: Option<Value>,
}

/// A one-way message that never receives a response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    /// Method name.
    pub method: String,
    /// Method parameters, omitted from the wire when `None`.
    pub params: Option<Value>,
}

/// The answer to a request: a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// Id of the request being answered.
    pub id: RequestId,
    /// Success payload.
    pub result: Option<Value>,
    /// Error payload.
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn failure(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Tagged union over the three JSON-RPC message kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// A call expecting a response.
    Request(JsonRpcRequest),
    /// A one-way message.
    Notification(JsonRpcNotification),
    /// The answer to a request.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Build a request message.
    #[must_use]
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(JsonRpcRequest {
            id,
            method: method.into(),
            params,
        })
    }

    /// Build a notification message.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(JsonRpcNotification {
            method: method.into(),
            params,
        })
    }

    /// Convert to the wire-level JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.into()));
        match self {
            Self::Request(req) => {
                map.insert("id".into(), id_value(&req.id));
                map.insert("method".into(), Value::String(req.method.clone()));
                if let Some(params) = &req.params {
                    map.insert("params".into(), params.clone());
                }
            }
            Self::Notification(note) => {
                map.insert("method".into(), Value::String(note.method.clone()));
                if let Some(params) = &note.params {
                    map.insert("params".into(), params.clone());
                }
            }
            Self::Response(resp) => {
                map.insert("id".into(), id_value(&resp.id));
                if let Some(err) = &resp.error {
                    map.insert("error".into(), error_value(err));
                } else {
                    map.insert(
                        "result".into(),
                        resp.result.clone().unwrap_or(Value::Null),
                    );
                }
            }
        }
        Value::Object(map)
    }

    /// Serialize to a compact single-line JSON string.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }
}

/// Envelope decode failure, split by recovery class.
#[derive(Debug)]
pub enum DecodeError {
    /// The text is not valid JSON (`PARSE_ERROR`).
    Parse(String),
    /// Valid JSON, but not one of the three message shapes
    /// (`INVALID_REQUEST`). Carries the `id` when one could be extracted so
    /// callers can answer the offending message.
    InvalidShape {
        /// Extracted id, if the object carried a usable one.
        id: Option<RequestId>,
        /// What was wrong with the shape.
        detail: String,
    },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(detail) => write!(f, "parse error: {detail}"),
            Self::InvalidShape { detail, .. } => write!(f, "invalid request: {detail}"),
        }
    }
}

/// Decode one wire message, discriminating by shape.
///
/// # Errors
///
/// [`DecodeError::Parse`] when `text` is not valid JSON;
/// [`DecodeError::InvalidShape`] when it is valid JSON but not a request,
/// notification, or response object.
pub fn decode(text: &str) -> std::result::Result<JsonRpcMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Parse(e.to_string()))?;
    classify(value)
}

/// Classify an already-parsed JSON value into a message.
///
/// # Errors
///
/// [`DecodeError::InvalidShape`] when `value` is not a request, notification,
/// or response object.
pub fn classify(value: Value) -> std::result::Result<JsonRpcMessage, DecodeError> {
    let Value::Object(map) = value else {
        return Err(DecodeError::InvalidShape {
            id: None,
            detail: "message is not a JSON object".into(),
        });
    };

    // An `id` key that is present but unusable (null, non-integral number)
    // must not silently demote the message to a notification.
    let id = match map.get("id") {
        None => None,
        Some(raw) => match parse_id(raw) {
            Some(id) => Some(id),
            None => {
                return Err(DecodeError::InvalidShape {
                    id: None,
                    detail: "`id` is not a number or string".into(),
                })
            }
        },
    };

    if let Some(method) = map.get("method") {
        let Some(method) = method.as_str() else {
            return Err(DecodeError::InvalidShape {
                id,
                detail: "`method` is not a string".into(),
            });
        };
        let params = map.get("params").cloned();
        return Ok(match id {
            Some(id) => JsonRpcMessage::Request(JsonRpcRequest {
                id,
                method: method.to_owned(),
                params,
            }),
            None => JsonRpcMessage::Notification(JsonRpcNotification {
                method: method.to_owned(),
                params,
            }),
        });
    }

    let has_result = map.contains_key("result");
    let has_error = map.contains_key("error");
    if has_result || has_error {
        let Some(id) = id else {
            return Err(DecodeError::InvalidShape {
                id: None,
                detail: "response is missing `id`".into(),
            });
        };
        if has_result && has_error {
            return Err(DecodeError::InvalidShape {
                id: Some(id),
                detail: "response carries both `result` and `error`".into(),
            });
        }
        let error = match map.get("error") {
            Some(raw) => Some(
                serde_json::from_value::<RpcError>(raw.clone()).map_err(|e| {
                    DecodeError::InvalidShape {
                        id: Some(id.clone()),
                        detail: format!("malformed `error` object: {e}"),
                    }
                })?,
            ),
            None => None,
        };
        return Ok(JsonRpcMessage::Response(JsonRpcResponse {
            id,
            result: map.get("result").cloned(),
            error,
        }));
    }

    Err(DecodeError::InvalidShape {
        id,
        detail: "object is neither request, notification, nor response".into(),
    })
}

/// Wire representation of a [`RequestId`].
fn id_value(id: &RequestId) -> Value {
    match id {
        RequestId::Number(n) => Value::Number((*n).into()),
        RequestId::Text(s) => Value::String(s.clone()),
    }
}

/// Wire representation of an [`RpcError`].
fn error_value(err: &RpcError) -> Value {
    let mut map = Map::new();
    map.insert("code".into(), Value::Number(err.code.into()));
    map.insert("message".into(), Value::String(err.message.clone()));
    if let Some(data) = &err.data {
        map.insert("data".into(), data.clone());
    }
    Value::Object(map)
}

/// Extract a usable [`RequestId`] from a raw `id` value.
///
/// `null` and non-integral numbers are not usable ids.
fn parse_id(raw: &Value) -> Option<RequestId> {
    match raw {
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        Value::String(s) => Some(RequestId::Text(s.clone())),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
