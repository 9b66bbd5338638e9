//! Fetch-style transport.
//!
//! Sends the request and hands back whatever the server answered; deciding
//! whether a 404 is a failure is left to the response converter. Statuses
//! listed in [`ArtSettings::error_statuses`](crate::config::ArtSettings) are
//! raised as exceptions instead, which makes them subject to retry.

use super::{build_reqwest, collect_response, reason_phrase, resolve_url, Transport, TransportKind, TransportRequest};
use crate::config::{ArtSettings, ConvertError};
use crate::error::{ArtError, Result};
use crate::types::{OperationResult, RawResponse};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Status reported for failures that carry no HTTP status
const UNKNOWN_STATUS: u16 = 1000;

/// Transport issuing plain HTTP requests.
#[derive(Debug, Clone)]
pub struct PlainTransport {
    client: reqwest::Client,
    base_url: Option<String>,
    default_headers: BTreeMap<String, String>,
    error_statuses: Vec<u16>,
}

impl PlainTransport {
    /// Create a transport from the process-wide settings
    pub fn new(settings: &ArtSettings) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();

        Self::with_client(client, settings)
    }

    /// Create a transport around an existing client
    pub fn with_client(client: reqwest::Client, settings: &ArtSettings) -> Self {
        PlainTransport {
            client,
            base_url: settings.base_url.clone(),
            default_headers: settings.default_headers.clone(),
            error_statuses: settings.error_statuses.clone(),
        }
    }
}

#[async_trait]
impl Transport for PlainTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Plain
    }

    async fn send(&self, request: &TransportRequest) -> Result<RawResponse> {
        let base = request.options.base_url.as_deref().or(self.base_url.as_deref());
        let url = resolve_url(base, &request.url);
        tracing::debug!("{} {}", request.method, url);

        let response = build_reqwest(&self.client, &url, request, &self.default_headers)
            .send()
            .await
            .map_err(|e| ArtError::Http(e.to_string()))?;

        let raw = collect_response(response).await?;
        if self.error_statuses.contains(&raw.status) {
            return Err(ArtError::Status {
                status: raw.status,
                message: reason_phrase(raw.status),
                body: raw.body,
            });
        }
        Ok(raw)
    }

    fn classify_error(&self, err: &ArtError, convert_error: Option<&ConvertError>) -> OperationResult {
        let default = match err {
            ArtError::Cancelled(_) => return OperationResult::cancelled("user cancel"),
            ArtError::Status { status, message, .. } => {
                OperationResult::failure(message.clone(), None, Some(*status))
            }
            other => OperationResult::failure(
                other.to_string(),
                Some("UNKNOWN_ERROR".to_string()),
                Some(UNKNOWN_STATUS),
            ),
        };
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
