//! Configuration for the request engine.
//!
//! Two layers exist:
//!
//! - [`ArtConfig`] is the process-wide default configuration. It owns the
//!   selected transport, the shared cache and the global hooks. It is built
//!   once at the application's composition root and handed to an
//!   [`ArtClient`](crate::ArtClient); nothing in the crate reads a global.
//! - [`FetchConfig`] is the flat per-store record. Library kind defaults,
//!   call-site configuration and per-invocation overrides are layered with
//!   [`FetchConfig::merge`], later layers winning.
//!
//! # Examples
//!
//! ```
//! use art_fetch::config::{ArtConfig, ArtSettings, CacheMode, FetchConfig};
//! use std::time::Duration;
//!
//! let settings = ArtSettings::from_json(r#"{"base_url": "https://api.example.com"}"#).unwrap();
//! let art = ArtConfig::builder().settings(settings).build();
//! assert_eq!(art.settings().base_url.as_deref(), Some("https://api.example.com"));
//!
//! let config = FetchConfig {
//!     cache: Some(CacheMode::On),
//!     cache_time: Some(Duration::from_secs(60)),
//!     ..Default::default()
//! };
//! let merged = FetchConfig::query_defaults().merge(&config);
//! assert!(merged.status_enabled());
//! ```

use crate::cache::{CacheStore, PersistentCache};
use crate::engine::LoadingTracker;
use crate::error::{ArtError, Result};
use crate::transport::{InterceptorClient, InterceptorTransport, PlainTransport, Transport, TransportKind};
use crate::types::{Body, Method, OperationResult, PageInfo, RawResponse};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Converts a raw transport response into an [`OperationResult`]
pub type ConvertRes =
    Arc<dyn Fn(RawResponse, TransportKind) -> BoxFuture<'static, Result<OperationResult>> + Send + Sync>;
/// Adjusts the adapter's default error shape for a transport failure
pub type ConvertError = Arc<dyn Fn(&ArtError, OperationResult) -> OperationResult + Send + Sync>;
/// Encodes pagination parameters into body fields
pub type ConvertPage = Arc<dyn Fn(&PageInfo) -> Body + Send + Sync>;
/// Side-effect hook without arguments (loading indicators)
pub type Hook = Arc<dyn Fn() + Send + Sync>;
/// Receives a settled result (messages, error and complete callbacks)
pub type ResultHook = Arc<dyn Fn(&OperationResult) + Send + Sync>;
/// Receives data and whether it came from the cache
pub type SuccessHook = Arc<dyn Fn(&Value, bool) + Send + Sync>;
/// Vetoes a retry when it returns false
pub type CheckRetry = Arc<dyn Fn(&OperationResult) -> bool + Send + Sync>;
/// Observes every transport exception
pub type HttpErrorHook = Arc<dyn Fn(&ArtError) + Send + Sync>;
/// Classifies exceptions raised by custom descriptors
pub type CustomErrorHook = Arc<dyn Fn(&ArtError) -> OperationResult + Send + Sync>;
/// Transforms the request body right before transport
pub type PostBody = Arc<dyn Fn(Body) -> Body + Send + Sync>;
/// Transforms successful data before it is written
pub type PostData = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Produces a value on demand
pub type ValueFn = Arc<dyn Fn() -> Value + Send + Sync>;
/// Derives a cache key suffix from the body
pub type CacheKeyFn = Arc<dyn Fn(&Body) -> String + Send + Sync>;
/// Extracts the next-page token from a result
pub type NextTokenFn = Arc<dyn Fn(&OperationResult) -> Option<String> + Send + Sync>;
/// Decides whether another page exists
pub type HasNextPageFn = Arc<dyn Fn(&OperationResult) -> bool + Send + Sync>;

/// Cache mode of a store.
#[derive(Clone, Default)]
pub enum CacheMode {
    /// No caching
    #[default]
    Off,
    /// Cache keyed by the literal request path
    On,
    /// Cache keyed by the string alone; stores naming the same key share an entry
    Key(String),
    /// Cache keyed by the request path plus a suffix computed from the body
    ByBody(CacheKeyFn),
}

impl CacheMode {
    /// Whether caching is enabled at all
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CacheMode::Off)
    }
}

impl fmt::Debug for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::Off => f.write_str("Off"),
            CacheMode::On => f.write_str("On"),
            CacheMode::Key(key) => f.debug_tuple("Key").field(key).finish(),
            CacheMode::ByBody(_) => f.write_str("ByBody(..)"),
        }
    }
}

/// Default request body, static or computed on every call.
#[derive(Clone)]
pub enum DefaultBody {
    /// Fixed fields
    Static(Body),
    /// Fields computed lazily
    Lazy(Arc<dyn Fn() -> Body + Send + Sync>),
}

impl DefaultBody {
    /// Resolve the body for this call
    pub fn resolve(&self) -> Body {
        match self {
            DefaultBody::Static(body) => body.clone(),
            DefaultBody::Lazy(f) => f(),
        }
    }
}

/// Seed value for `data`, fixed or computed at construction.
#[derive(Clone)]
pub enum SeedData {
    /// Fixed value
    Value(Value),
    /// Computed value
    Lazy(ValueFn),
}

impl SeedData {
    /// Resolve the seed
    pub fn resolve(&self) -> Value {
        match self {
            SeedData::Value(value) => value.clone(),
            SeedData::Lazy(f) => f(),
        }
    }
}

/// Extra options merged into the transport's native request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Additional headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base URL overriding the process-wide one
    #[serde(default)]
    pub base_url: Option<String>,
    /// Additional query pairs
    #[serde(default)]
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    /// Merge `over` on top of `self`
    pub fn merge(&self, over: &RequestOptions) -> RequestOptions {
        let mut headers = self.headers.clone();
        headers.extend(over.headers.clone());
        let mut query = self.query.clone();
        query.extend(over.query.clone());
        RequestOptions {
            headers,
            base_url: over.base_url.clone().or_else(|| self.base_url.clone()),
            query,
        }
    }
}

/// Flat per-store configuration. Every field is optional so layers can be merged.
#[derive(Clone, Default)]
pub struct FetchConfig {
    /// HTTP method; defaults from the URL and body when absent
    pub method: Option<Method>,
    /// Track status on the store
    pub status: Option<bool>,
    /// Drive the loading-indicator hooks
    pub loading: Option<bool>,
    /// Write result data to the store
    pub is_default_set: Option<bool>,
    /// Clear data, body and status before each call
    pub auto_clear: Option<bool>,
    /// Replace rather than merge the stored body
    pub replace_body: Option<bool>,
    /// Bypass the cache for this call
    pub refresh: Option<bool>,
    /// Default request body
    pub default_body: Option<DefaultBody>,
    /// Body transform applied right before transport
    pub post_body: Option<PostBody>,
    /// Data transform applied before writing `data`
    pub post_data: Option<PostData>,
    /// Response converter overriding the process-wide one
    pub convert_res: Option<ConvertRes>,
    /// Called with the data on success
    pub on_success: Option<SuccessHook>,
    /// Called on non-cancelled failure
    pub on_error: Option<ResultHook>,
    /// Called after every settled call
    pub on_complete: Option<ResultHook>,
    /// Retry budget
    pub retry: Option<u32>,
    /// Delay between retries
    pub retry_interval: Option<Duration>,
    /// Per-store retry predicate
    pub check_retry: Option<CheckRetry>,
    /// Debounce window
    pub debounce: Option<Duration>,
    /// Throttle window
    pub throttle: Option<Duration>,
    /// Cache mode
    pub cache: Option<CacheMode>,
    /// Cache entry lifetime
    pub cache_time: Option<Duration>,
    /// Age after which a cache hit triggers a background refresh
    pub revalidate: Option<Duration>,
    /// Loading flag for the background refresh
    pub cache_loading: Option<bool>,
    /// Status flag for the background refresh
    pub cache_status: Option<bool>,
    /// Per-store loading start hook
    pub start_loading: Option<Hook>,
    /// Per-store loading end hook
    pub end_loading: Option<Hook>,
    /// Show both success and error messages
    pub show_message: Option<bool>,
    /// Show success messages
    pub show_success_message: Option<bool>,
    /// Show error messages
    pub show_error_message: Option<bool>,
    /// Replaces the message of successful results before display
    pub success_message: Option<String>,
    /// Replaces the message of failed results before display
    pub error_message: Option<String>,
    /// Minimum time spent in `loading`
    pub loading_delay: Option<Duration>,
    /// Transport request options
    pub request_options: Option<RequestOptions>,
    /// Initial `data`
    pub initial_data: Option<SeedData>,
    /// Shown when a written result is empty
    pub placeholder_data: Option<SeedData>,
    /// Seed `data` from an existing cache entry at construction
    pub initialize_cache: Option<bool>,
    /// Page size for paged stores
    pub page_size: Option<u32>,
    /// Append pages instead of replacing them
    pub infinite: Option<bool>,
    /// Next-page token extractor
    pub get_next_token: Option<NextTokenFn>,
    /// Explicit has-next-page predicate
    pub has_next_page: Option<HasNextPageFn>,
}

macro_rules! merge_fields {
    ($base:expr, $over:expr, { $($field:ident),* $(,)? }) => {
        FetchConfig {
            $($field: $over.$field.clone().or_else(|| $base.$field.clone()),)*
        }
    };
}

impl FetchConfig {
    /// Layer `over` on top of `self`; fields set in `over` win
    pub fn merge(&self, over: &FetchConfig) -> FetchConfig {
        let request_options = match (&self.request_options, &over.request_options) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (base, over) => over.clone().or_else(|| base.clone()),
        };
        FetchConfig {
            request_options,
            ..merge_fields!(self, over, {
                method, status, loading, is_default_set, auto_clear, replace_body, refresh,
                default_body, post_body, post_data, convert_res, on_success, on_error,
                on_complete, retry, retry_interval, check_retry, debounce, throttle, cache,
                cache_time, revalidate, cache_loading, cache_status, start_loading, end_loading,
                show_message, show_success_message, show_error_message, success_message,
                error_message, loading_delay, request_options, initial_data, placeholder_data,
                initialize_cache, page_size, infinite, get_next_token, has_next_page,
            })
        }
    }

    /// Defaults for query stores
    pub fn query_defaults() -> FetchConfig {
        FetchConfig {
            status: Some(true),
            loading: Some(false),
            is_default_set: Some(true),
            auto_clear: Some(false),
            cache_time: Some(Duration::from_secs(300)),
            retry: Some(0),
            show_message: Some(false),
            show_success_message: Some(false),
            show_error_message: Some(true),
            ..Default::default()
        }
    }

    /// Defaults for mutation stores
    pub fn mutation_defaults() -> FetchConfig {
        FetchConfig {
            status: Some(true),
            loading: Some(false),
            is_default_set: Some(true),
            show_message: Some(true),
            show_success_message: Some(true),
            show_error_message: Some(true),
            ..Default::default()
        }
    }

    /// Defaults for classic paged stores
    pub fn page_defaults() -> FetchConfig {
        FetchConfig {
            retry: Some(3),
            page_size: Some(10),
            ..FetchConfig::query_defaults()
        }
    }

    /// Defaults for infinite stores
    pub fn infinite_defaults() -> FetchConfig {
        FetchConfig {
            page_size: Some(10),
            ..FetchConfig::query_defaults()
        }
    }

    /// Whether status is tracked
    pub fn status_enabled(&self) -> bool {
        self.status.unwrap_or(true)
    }

    /// Whether loading hooks fire
    pub fn loading_enabled(&self) -> bool {
        self.loading.unwrap_or(false)
    }

    /// Whether result data is written
    pub fn writes_data(&self) -> bool {
        self.is_default_set.unwrap_or(true)
    }

    /// Effective cache mode; a revalidate window implies caching
    pub fn cache_mode(&self) -> CacheMode {
        match &self.cache {
            Some(mode) if mode.is_enabled() => mode.clone(),
            _ if self.revalidate.is_some() => CacheMode::On,
            _ => CacheMode::Off,
        }
    }

    /// Retry budget; a bare interval means effectively unlimited
    pub fn retry_budget(&self) -> u32 {
        match (self.retry, self.retry_interval) {
            (Some(n), _) if n > 0 => n,
            (_, Some(_)) => u32::MAX,
            _ => 0,
        }
    }

    /// Delay between retries, one second by default
    pub fn retry_delay(&self) -> Duration {
        self.retry_interval.unwrap_or(Duration::from_secs(1))
    }

    /// Whether successful results are displayed
    pub fn shows_success(&self) -> bool {
        self.show_success_message.unwrap_or(false) || self.show_message.unwrap_or(false)
    }

    /// Whether failed results are displayed
    pub fn shows_error(&self) -> bool {
        self.show_error_message.unwrap_or(false) || self.show_message.unwrap_or(false)
    }

    /// Page size, ten by default
    pub fn page_size_or_default(&self) -> u32 {
        self.page_size.unwrap_or(10)
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("method", &self.method)
            .field("status", &self.status)
            .field("loading", &self.loading)
            .field("retry", &self.retry)
            .field("retry_interval", &self.retry_interval)
            .field("debounce", &self.debounce)
            .field("throttle", &self.throttle)
            .field("cache", &self.cache)
            .field("cache_time", &self.cache_time)
            .field("revalidate", &self.revalidate)
            .field("page_size", &self.page_size)
            .field("infinite", &self.infinite)
            .finish_non_exhaustive()
    }
}

/// Plain-data part of the process-wide configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtSettings {
    /// Prefix for relative request paths
    pub base_url: Option<String>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Statuses the plain transport treats as exceptions
    pub error_statuses: Vec<u16>,
    /// Consult the persistent cache backing
    pub local_cache: bool,
    /// Maximum number of in-memory cache entries
    pub cache_capacity: usize,
}

impl Default for ArtSettings {
    fn default() -> Self {
        ArtSettings {
            base_url: None,
            default_headers: BTreeMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            error_statuses: Vec::new(),
            local_cache: true,
            cache_capacity: 1024,
        }
    }
}

impl ArtSettings {
    /// Parse settings from a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Process-wide configuration shared by every store built from one client.
pub struct ArtConfig {
    settings: ArtSettings,
    transport: Arc<dyn Transport>,
    cache: CacheStore,
    loading: Arc<LoadingTracker>,
    /// Response converter used when a store has none
    pub convert_res: ConvertRes,
    /// Error shape adjuster applied by the transports
    pub convert_error: Option<ConvertError>,
    /// Page encoding
    pub convert_page: Option<ConvertPage>,
    /// Global loading start hook
    pub start_loading: Option<Hook>,
    /// Global loading end hook
    pub end_loading: Option<Hook>,
    /// Displays success messages
    pub show_success_message: Option<ResultHook>,
    /// Displays error messages
    pub show_error_message: Option<ResultHook>,
    /// Observes every transport exception
    pub handle_http_error: Option<HttpErrorHook>,
    /// Classifies exceptions from custom descriptors
    pub handle_custom_http_error: Option<CustomErrorHook>,
    /// Default retry predicate
    pub check_retry: Option<CheckRetry>,
}

impl ArtConfig {
    /// Start building a configuration
    pub fn builder() -> ArtConfigBuilder {
        ArtConfigBuilder::default()
    }

    /// Plain-data settings
    pub fn settings(&self) -> &ArtSettings {
        &self.settings
    }

    /// Selected transport
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Shared cache
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Shared in-flight tracker for loading indicators
    pub fn loading(&self) -> &Arc<LoadingTracker> {
        &self.loading
    }
}

impl Default for ArtConfig {
    fn default() -> Self {
        ArtConfig::builder().build()
    }
}

impl fmt::Debug for ArtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtConfig")
            .field("settings", &self.settings)
            .field("transport", &self.transport.kind())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ArtConfig`].
#[derive(Default)]
pub struct ArtConfigBuilder {
    settings: ArtSettings,
    interceptor: Option<InterceptorClient>,
    transport: Option<Arc<dyn Transport>>,
    persistence: Option<Arc<dyn PersistentCache>>,
    convert_res: Option<ConvertRes>,
    convert_error: Option<ConvertError>,
    convert_page: Option<ConvertPage>,
    start_loading: Option<Hook>,
    end_loading: Option<Hook>,
    show_success_message: Option<ResultHook>,
    show_error_message: Option<ResultHook>,
    handle_http_error: Option<HttpErrorHook>,
    handle_custom_http_error: Option<CustomErrorHook>,
    check_retry: Option<CheckRetry>,
}

impl ArtConfigBuilder {
    /// Replace the plain-data settings
    pub fn settings(mut self, settings: ArtSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.base_url = Some(url.into());
        self
    }

    /// Register an interceptor-capable client; selects the interceptor transport
    pub fn interceptor(mut self, client: InterceptorClient) -> Self {
        self.interceptor = Some(client);
        self
    }

    /// Use a hand-written transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Persistent cache backing, consulted when `local_cache` is on
    pub fn persistence(mut self, persistence: Arc<dyn PersistentCache>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Default response converter
    pub fn convert_res(mut self, convert: ConvertRes) -> Self {
        self.convert_res = Some(convert);
        self
    }

    /// Error shape adjuster
    pub fn convert_error(mut self, convert: ConvertError) -> Self {
        self.convert_error = Some(convert);
        self
    }

    /// Page encoding
    pub fn convert_page(mut self, convert: ConvertPage) -> Self {
        self.convert_page = Some(convert);
        self
    }

    /// Global loading hooks
    pub fn loading_hooks(mut self, start: Hook, end: Hook) -> Self {
        self.start_loading = Some(start);
        self.end_loading = Some(end);
        self
    }

    /// Message display hooks
    pub fn message_hooks(mut self, success: ResultHook, error: ResultHook) -> Self {
        self.show_success_message = Some(success);
        self.show_error_message = Some(error);
        self
    }

    /// Observer for transport exceptions
    pub fn handle_http_error(mut self, hook: HttpErrorHook) -> Self {
        self.handle_http_error = Some(hook);
        self
    }

    /// Classifier for custom descriptor exceptions
    pub fn handle_custom_http_error(mut self, hook: CustomErrorHook) -> Self {
        self.handle_custom_http_error = Some(hook);
        self
    }

    /// Default retry predicate
    pub fn check_retry(mut self, check: CheckRetry) -> Self {
        self.check_retry = Some(check);
        self
    }

    /// Finish the configuration, selecting the transport
    pub fn build(self) -> ArtConfig {
        let transport: Arc<dyn Transport> = match (self.transport, self.interceptor) {
            (Some(transport), _) => transport,
            (None, Some(client)) => Arc::new(InterceptorTransport::new(&self.settings, client)),
            (None, None) => Arc::new(PlainTransport::new(&self.settings)),
        };
        let persistence = if self.settings.local_cache { self.persistence } else { None };
        ArtConfig {
            cache: CacheStore::new(self.settings.cache_capacity, persistence),
            settings: self.settings,
            transport,
            loading: Arc::new(LoadingTracker::default()),
            convert_res: self.convert_res.unwrap_or_else(default_convert_res),
            convert_error: self.convert_error,
            convert_page: self.convert_page,
            start_loading: self.start_loading,
            end_loading: self.end_loading,
            show_success_message: self.show_success_message,
            show_error_message: self.show_error_message,
            handle_http_error: self.handle_http_error,
            handle_custom_http_error: self.handle_custom_http_error,
            check_retry: Some(self.check_retry.unwrap_or_else(default_check_retry)),
        }
    }
}

/// Reads `{data, count}` from a JSON body; success follows the HTTP status.
pub fn default_convert_res() -> ConvertRes {
    Arc::new(|raw: RawResponse, _kind: TransportKind| {
        async move {
            let body = raw.json_body().map_err(|e| ArtError::Conversion(e.to_string()))?;
            let mut result = OperationResult {
                success: raw.is_success(),
                status: Some(raw.status),
                data: body.get("data").cloned(),
                total: body.get("count").and_then(Value::as_u64),
                ..Default::default()
            };
            if !result.success {
                result.message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| http::StatusCode::from_u16(raw.status).ok()
                        .and_then(|s| s.canonical_reason())
                        .map(str::to_string));
            }
            Ok(result)
        }
        .boxed()
    })
}

/// Reads the body as an [`OperationResult`] envelope.
pub fn envelope_convert_res() -> ConvertRes {
    Arc::new(|raw: RawResponse, _kind: TransportKind| {
        async move {
            let mut result: OperationResult = serde_json::from_slice(&raw.body)
                .map_err(|e| ArtError::Conversion(e.to_string()))?;
            if result.status.is_none() {
                result.status = Some(raw.status);
            }
            Ok(result)
        }
        .boxed()
    })
}

/// Never retries 400, 401 or 403.
pub fn default_check_retry() -> CheckRetry {
    Arc::new(|res: &OperationResult| !matches!(res.status, Some(400) | Some(401) | Some(403)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_later_wins() {
        let base = FetchConfig::query_defaults();
        let over = FetchConfig {
            status: Some(false),
            retry: Some(2),
            ..Default::default()
        };
        let merged = base.merge(&over);
        assert!(!merged.status_enabled());
        assert_eq!(merged.retry, Some(2));
        assert_eq!(merged.cache_time, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_request_options_merge() {
        let base = FetchConfig {
            request_options: Some(RequestOptions {
                headers: BTreeMap::from([("a".into(), "1".into()), ("b".into(), "1".into())]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let over = FetchConfig {
            request_options: Some(RequestOptions {
                headers: BTreeMap::from([("b".into(), "2".into())]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = base.merge(&over).request_options.unwrap();
        assert_eq!(merged.headers["a"], "1");
        assert_eq!(merged.headers["b"], "2");
    }

    #[test]
    fn test_retry_budget() {
        let none = FetchConfig::default();
        assert_eq!(none.retry_budget(), 0);

        let counted = FetchConfig { retry: Some(3), ..Default::default() };
        assert_eq!(counted.retry_budget(), 3);

        let interval_only = FetchConfig {
            retry_interval: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        assert_eq!(interval_only.retry_budget(), u32::MAX);
        assert_eq!(interval_only.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_revalidate_implies_cache() {
        let config = FetchConfig {
            revalidate: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        assert!(config.cache_mode().is_enabled());
        assert!(!FetchConfig::default().cache_mode().is_enabled());
    }

    #[test]
    fn test_message_flags() {
        let query = FetchConfig::query_defaults();
        assert!(!query.shows_success());
        assert!(query.shows_error());
        assert!(FetchConfig::mutation_defaults().shows_success());
    }

    #[test]
    fn test_settings_from_json() {
        let settings = ArtSettings::from_json(r#"{"error_statuses": [500], "cache_capacity": 8}"#).unwrap();
        assert_eq!(settings.error_statuses, vec![500]);
        assert_eq!(settings.cache_capacity, 8);
        assert!(settings.local_cache);
        assert!(ArtSettings::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_default_convert_res() {
        let raw = RawResponse::json(200, &json!({"data": [1, 2], "count": 2}));
        let res = default_convert_res()(raw, TransportKind::Plain).await.unwrap();
        assert!(res.success);
        assert_eq!(res.total, Some(2));

        let raw = RawResponse::json(404, &json!({}));
        let res = default_convert_res()(raw, TransportKind::Plain).await.unwrap();
        assert!(!res.success);
        assert_eq!(res.message.as_deref(), Some("Not Found"));
    }

    #[tokio::test]
    async fn test_envelope_convert_res() {
        let raw = RawResponse::json(200, &json!({"success": true, "data": [1, 2, 3], "total": 3}));
        let res = envelope_convert_res()(raw, TransportKind::Custom).await.unwrap();
        assert_eq!(res.data, Some(json!([1, 2, 3])));
        assert_eq!(res.status, Some(200));

        let raw = RawResponse { status: 200, body: "<html>".into(), ..Default::default() };
        let err = envelope_convert_res()(raw, TransportKind::Custom).await.unwrap_err();
        assert!(matches!(err, ArtError::Conversion(_)));
    }

    #[test]
    fn test_default_check_retry() {
        let check = default_check_retry();
        assert!(!check(&OperationResult::failure("no", None, Some(401))));
        assert!(check(&OperationResult::failure("later", None, Some(503))));
    }
}
