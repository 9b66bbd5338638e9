//! Transport built around an interceptor-capable client.
//!
//! Request interceptors run in registration order over the outgoing
//! `reqwest::RequestBuilder` (auth headers, tracing ids); response
//! interceptors run over every [`RawResponse`] before its status is checked
//! and may reject it. Any non-2xx status is an error whose `code` and
//! `message` are read from a JSON envelope when the server sends one.

use super::{build_reqwest, collect_response, reason_phrase, resolve_url, Transport, TransportKind, TransportRequest};
use crate::config::{ArtSettings, ConvertError};
use crate::error::{ArtError, Result};
use crate::types::{OperationResult, RawResponse};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Status reported when no response was received
const NO_RESPONSE_STATUS: u16 = 500;

/// Rewrites an outgoing request
pub type RequestInterceptor = Arc<dyn Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync>;
/// Inspects or rejects an incoming response
pub type ResponseInterceptor = Arc<dyn Fn(RawResponse) -> Result<RawResponse> + Send + Sync>;

/// A reqwest client plus its interceptor chains.
///
/// # Examples
///
/// ```
/// use art_fetch::transport::InterceptorClient;
/// use std::sync::Arc;
///
/// let client = InterceptorClient::new(reqwest::Client::new())
///     .on_request(Arc::new(|req: reqwest::RequestBuilder| req.bearer_auth("token")));
/// assert_eq!(client.request_interceptor_count(), 1);
/// ```
#[derive(Clone)]
pub struct InterceptorClient {
    client: reqwest::Client,
    request_interceptors: Vec<RequestInterceptor>,
    response_interceptors: Vec<ResponseInterceptor>,
}

impl InterceptorClient {
    /// Wrap a client with empty interceptor chains
    pub fn new(client: reqwest::Client) -> Self {
        InterceptorClient {
            client,
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    /// Append a request interceptor
    pub fn on_request(mut self, interceptor: RequestInterceptor) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Append a response interceptor
    pub fn on_response(mut self, interceptor: ResponseInterceptor) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Number of request interceptors
    pub fn request_interceptor_count(&self) -> usize {
        self.request_interceptors.len()
    }

    /// The client's cancel predicate
    pub fn is_cancel(err: &ArtError) -> bool {
        err.is_cancel()
    }
}

impl Default for InterceptorClient {
    fn default() -> Self {
        InterceptorClient::new(reqwest::Client::new())
    }
}

/// Transport delegating to an [`InterceptorClient`].
#[derive(Clone)]
pub struct InterceptorTransport {
    inner: InterceptorClient,
    base_url: Option<String>,
    default_headers: BTreeMap<String, String>,
}

impl InterceptorTransport {
    /// Create a transport from the process-wide settings
    pub fn new(settings: &ArtSettings, client: InterceptorClient) -> Self {
        InterceptorTransport {
            inner: client,
            base_url: settings.base_url.clone(),
            default_headers: settings.default_headers.clone(),
        }
    }
}

/// Read `{code, message}` from an error body, if it is JSON
fn read_envelope(body: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return (None, None);
    };
    let code = value.get("code").map(|c| match c {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    let message = value.get("message").and_then(Value::as_str).map(str::to_string);
    (code, message)
}

#[async_trait]
impl Transport for InterceptorTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Interceptor
    }

    async fn send(&self, request: &TransportRequest) -> Result<RawResponse> {
        let base = request.options.base_url.as_deref().or(self.base_url.as_deref());
        let url = resolve_url(base, &request.url);
        tracing::debug!("{} {} (intercepted)", request.method, url);

        let builder = build_reqwest(&self.inner.client, &url, request, &self.default_headers);
        let builder = self
            .inner
            .request_interceptors
            .iter()
            .fold(builder, |builder, interceptor| interceptor(builder));

        let response = builder.send().await.map_err(|e| ArtError::Http(e.to_string()))?;
        let mut raw = collect_response(response).await?;
        for interceptor in &self.inner.response_interceptors {
            raw = interceptor(raw)?;
        }

        if !raw.is_success() {
            let (_, message) = read_envelope(&raw.body);
            return Err(ArtError::Status {
                status: raw.status,
                message: message.unwrap_or_else(|| reason_phrase(raw.status)),
                body: raw.body,
            });
        }
        Ok(raw)
    }

    fn classify_error(&self, err: &ArtError, convert_error: Option<&ConvertError>) -> OperationResult {
        if InterceptorClient::is_cancel(err) {
            let message = match err {
                ArtError::Cancelled(message) => message.clone(),
                other => other.to_string(),
            };
            return OperationResult::cancelled(message);
        }
        let ArtError::Status { status, message, body } = err else {
            return OperationResult::failure("unknown error", Some(String::new()), Some(NO_RESPONSE_STATUS));
        };

        let (code, envelope_message) = read_envelope(body);
        let default = OperationResult::failure(
            envelope_message.unwrap_or_else(|| message.clone()),
            code,
            Some(*status),
        );
        match convert_error {
            Some(convert) => OperationResult {
                success: false,
                is_cancel: false,
                ..convert(err, default)
            },
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestOptions;
    use crate::types::Method;
    use bytes::Bytes;

    fn get(url: &str) -> TransportRequest {
        TransportRequest {
            method: Method::Get,
            url: url.into(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_request_interceptors_apply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me")
            .match_header("x-trace", "1")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = InterceptorClient::default()
            .on_request(Arc::new(|req: reqwest::RequestBuilder| req.header("x-trace", "1")))
            .on_request(Arc::new(|req: reqwest::RequestBuilder| req.bearer_auth("token")));
        let settings = ArtSettings { base_url: Some(server.url()), ..Default::default() };
        let transport = InterceptorTransport::new(&settings, client);

        let raw = transport.send(&get("/me")).await.unwrap();
        assert_eq!(raw.status, 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_reads_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/locked")
            .with_status(423)
            .with_body(r#"{"code": "LOCKED", "message": "account locked"}"#)
            .create_async()
            .await;

        let settings = ArtSettings { base_url: Some(server.url()), ..Default::default() };
        let transport = InterceptorTransport::new(&settings, InterceptorClient::default());

        let err = transport.send(&get("/locked")).await.unwrap_err();
        let res = transport.classify_error(&err, None);
        assert_eq!(res.status, Some(423));
        assert_eq!(res.code.as_deref(), Some("LOCKED"));
        assert_eq!(res.message.as_deref(), Some("account locked"));
    }

    #[tokio::test]
    async fn test_response_interceptor_can_reject() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/ok").with_status(200).create_async().await;

        let client = InterceptorClient::default().on_response(Arc::new(|raw: RawResponse| {
            if raw.headers.contains_key("x-maintenance") {
                Ok(raw)
            } else {
                Err(ArtError::Status { status: 503, message: "maintenance".into(), body: Bytes::new() })
            }
        }));
        let settings = ArtSettings { base_url: Some(server.url()), ..Default::default() };
        let transport = InterceptorTransport::new(&settings, client);

        let err = transport.send(&get("/ok")).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_classify_without_response() {
        let transport = InterceptorTransport::new(&ArtSettings::default(), InterceptorClient::default());
        let res = transport.classify_error(&ArtError::Http("dns".into()), None);
        assert_eq!(res.status, Some(NO_RESPONSE_STATUS));
        assert_eq!(res.message.as_deref(), Some("unknown error"));

        let res = transport.classify_error(&ArtError::Cancelled("navigated away".into()), None);
        assert!(res.is_cancel);
        assert_eq!(res.message.as_deref(), Some("navigated away"));
    }

    #[test]
    fn test_convert_error_merges_over_default() {
        let transport = InterceptorTransport::new(&ArtSettings::default(), InterceptorClient::default());
        let convert: ConvertError = Arc::new(|_: &ArtError, default: OperationResult| OperationResult {
            message: Some("please sign in".into()),
            ..default
        });
        let err = ArtError::Status { status: 401, message: "Unauthorized".into(), body: Bytes::new() };
        let res = transport.classify_error(&err, Some(&convert));
        assert_eq!(res.status, Some(401));
        assert_eq!(res.message.as_deref(), Some("please sign in"));
    }
}
