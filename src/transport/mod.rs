//! Transport adapters.
//!
//! A transport turns a `(method, url, body)` triple into a raw response and
//! classifies its failures. Two implementations exist and one is selected per
//! [`ArtConfig`](crate::ArtConfig):
//!
//! | Transport | Selected when | Non-2xx | Cancellation |
//! |-----------|---------------|---------|--------------|
//! | [`PlainTransport`] | no interceptor client registered | converter decides, unless listed in `error_statuses` | per-call token |
//! | [`InterceptorTransport`] | an [`InterceptorClient`] is registered | always an error, envelope read | per-call token, checked with the client's cancel predicate |
//!
//! The engine only ever sees a [`TransportCall`]: a re-invocable request
//! function paired with an optional [`CancelHandle`].
//!
//! # Module Organization
//!
//! ```text
//! transport/
//! ├── plain       - fetch-style transport
//! └── interceptor - transport with request/response interceptors
//! ```

mod interceptor;
mod plain;

pub use interceptor::{InterceptorClient, InterceptorTransport, RequestInterceptor, ResponseInterceptor};
pub use plain::PlainTransport;

use crate::config::{ConvertError, RequestOptions};
use crate::error::{ArtError, Result};
use crate::types::{Body, Method, OperationResult, RawResponse};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which adapter produced a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// [`PlainTransport`]
    Plain,
    /// [`InterceptorTransport`]
    Interceptor,
    /// A custom descriptor bypassing the built-in adapters
    Custom,
}

/// A fully resolved transport request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// URL, possibly relative to the base URL
    pub url: String,
    /// Payload
    pub body: Option<Body>,
    /// Native request options
    pub options: RequestOptions,
}

/// Cancellation handle paired 1:1 with one transport call.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Abort the call; later invocations fail immediately
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the call has been aborted
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Re-invocable request function; each invocation performs one attempt.
pub type RequestFn = Arc<dyn Fn() -> BoxFuture<'static, Result<RawResponse>> + Send + Sync>;

/// One prepared call.
#[derive(Clone)]
pub struct TransportCall {
    request: RequestFn,
    cancel: Option<CancelHandle>,
    kind: TransportKind,
}

impl TransportCall {
    /// Wrap a request function
    pub fn new(request: RequestFn, cancel: Option<CancelHandle>, kind: TransportKind) -> Self {
        TransportCall { request, cancel, kind }
    }

    /// Perform one attempt
    pub async fn execute(&self) -> Result<RawResponse> {
        (self.request)().await
    }

    /// Cancel handle, absent for custom calls
    pub fn cancel_handle(&self) -> Option<&CancelHandle> {
        self.cancel.as_ref()
    }

    /// Adapter that produced the call
    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

/// A transport adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Adapter kind
    fn kind(&self) -> TransportKind;

    /// Perform one request
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse>;

    /// Map a failure to the engine's result shape
    fn classify_error(&self, err: &ArtError, convert_error: Option<&ConvertError>) -> OperationResult;
}

/// Prepare a cancellable call on `transport`.
///
/// Every invocation of the returned request races the transport against the
/// call's cancel handle, so a cancelled call never resolves with a response.
pub fn execute(
    transport: Arc<dyn Transport>,
    method: Method,
    url: String,
    body: Option<Body>,
    options: RequestOptions,
) -> TransportCall {
    let handle = CancelHandle::default();
    let kind = transport.kind();
    let request = Arc::new(TransportRequest { method, url, body, options });
    let token = handle.token().clone();

    let request_fn: RequestFn = Arc::new(move || {
        let transport = Arc::clone(&transport);
        let request = Arc::clone(&request);
        let token = token.clone();
        async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ArtError::Cancelled("user cancel".to_string())),
                res = transport.send(&request) => res,
            }
        }
        .boxed()
    });

    TransportCall::new(request_fn, Some(handle), kind)
}

/// Default classification for failures of custom descriptors.
pub fn classify_custom_error(err: &ArtError) -> OperationResult {
    match err {
        ArtError::Cancelled(message) => OperationResult::cancelled(message.clone()),
        ArtError::Status { status, message, .. } => {
            OperationResult::failure(message.clone(), None, Some(*status))
        }
        other => OperationResult::failure(other.to_string(), Some("UNKNOWN_ERROR".to_string()), None),
    }
}

/// Join a request path onto a base URL.
///
/// Relative paths gain a leading `/`; absolute URLs are left alone.
pub fn resolve_url(base_url: Option<&str>, url: &str) -> String {
    if url::Url::parse(url).is_ok() {
        return url.to_string();
    }
    let path = if url.starts_with('/') { url.to_string() } else { format!("/{}", url) };
    match base_url {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path,
    }
}

/// Scalar body fields as query pairs; nested values are JSON encoded.
pub(crate) fn body_to_query(body: &Body) -> Vec<(String, String)> {
    body.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Attach headers, query and body to a reqwest builder.
pub(crate) fn build_reqwest(
    client: &reqwest::Client,
    url: &str,
    request: &TransportRequest,
    default_headers: &BTreeMap<String, String>,
) -> reqwest::RequestBuilder {
    let mut builder = client.request(request.method.into(), url);
    for (k, v) in default_headers.iter().chain(request.options.headers.iter()) {
        builder = builder.header(k, v);
    }
    if !request.options.query.is_empty() {
        builder = builder.query(&request.options.query);
    }
    if let Some(body) = &request.body {
        builder = if request.method.sends_query() {
            builder.query(&body_to_query(body))
        } else {
            builder.json(body)
        };
    }
    builder
}

/// Read a reqwest response into a [`RawResponse`].
pub(crate) async fn collect_response(response: reqwest::Response) -> Result<RawResponse> {
    let status = response.status().as_u16();

    let mut headers = BTreeMap::new();
    for (k, v) in response.headers() {
        if let Ok(val) = v.to_str() {
            headers.insert(k.as_str().to_string(), val.to_string());
        }
    }

    let body = response.bytes().await.map_err(|e| ArtError::Http(e.to_string()))?;

    Ok(RawResponse { status, headers, body })
}

pub(crate) fn reason_phrase(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}
