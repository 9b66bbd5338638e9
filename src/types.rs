//! Core data types shared by every layer.
//!
//! The only bit-exact contract the crate owns is [`OperationResult`]: every
//! response converter must produce one, and every awaited operation settles
//! with one. Everything else here is plumbing between the request builder,
//! transports and the engine.

use crate::error::ArtError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Request payload: a JSON object whose fields can be merged layer by layer.
pub type Body = Map<String, Value>;

/// HTTP method used for a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl Method {
    /// Whether the body travels as query parameters rather than a JSON payload
    pub fn sends_query(&self) -> bool {
        matches!(self, Method::Get | Method::Delete | Method::Head | Method::Options)
    }

    /// Upper-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ArtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(ArtError::Configuration(format!("unsupported method: {}", other))),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
            Method::Head => http::Method::HEAD,
            Method::Options => http::Method::OPTIONS,
        }
    }
}

/// Lifecycle status of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing requested yet, or the last request was cancelled
    #[default]
    Idle,
    /// A tracked request is in flight
    Loading,
    /// The last request succeeded
    Success,
    /// The last request failed
    Error,
}

/// Failure detail stored on the store's `error` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Application or transport error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// HTTP status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Normalized outcome of one operation.
///
/// When `success` is false and `is_cancel` is false, `message`/`code`/`status`
/// describe the failure. When `is_cancel` is true no error callback fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
    /// Result payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Message for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// HTTP status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Total item count for paged results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Set when the operation was cancelled
    #[serde(default)]
    pub is_cancel: bool,
    /// Free-form envelope metadata (next-page tokens and the like)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl OperationResult {
    /// Successful result carrying `data`
    pub fn ok(data: Value) -> Self {
        OperationResult {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    /// Failed result
    pub fn failure(message: impl Into<String>, code: Option<String>, status: Option<u16>) -> Self {
        OperationResult {
            success: false,
            message: Some(message.into()),
            code,
            status,
            ..Default::default()
        }
    }

    /// Cancellation-shaped result
    pub fn cancelled(message: impl Into<String>) -> Self {
        OperationResult {
            success: false,
            message: Some(message.into()),
            is_cancel: true,
            ..Default::default()
        }
    }

    /// Attach a total count
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Attach envelope metadata
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Whether this is a failure that should be reported
    pub fn is_error(&self) -> bool {
        !self.success && !self.is_cancel
    }

    /// Failure detail for the store
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo {
            message: self.message.clone(),
            code: self.code.clone(),
            status: self.status,
        }
    }

    /// Number of items when `data` is an array
    pub fn data_len(&self) -> Option<usize> {
        self.data.as_ref().and_then(Value::as_array).map(Vec::len)
    }
}

/// Response as handed back by a transport, before conversion.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (lower-case names)
    pub headers: BTreeMap<String, String>,
    /// Response body
    pub body: Bytes,
}

impl RawResponse {
    /// Build a response with a JSON body, as custom descriptors typically do
    pub fn json(status: u16, value: &Value) -> Self {
        RawResponse {
            status,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: Bytes::from(value.to_string()),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json_body(&self) -> crate::Result<Value> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Pagination parameters merged into the request body ahead of caller fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-based page index
    pub current: u32,
    /// Page size
    pub page_size: u32,
    /// Cursor for token based pagination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}
