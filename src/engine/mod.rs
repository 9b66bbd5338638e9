//! Execution engine.
//!
//! One [`Engine`] drives every operation of one store. It is built before the
//! store exists, so every method takes the [`Store`] it mutates as its first
//! argument; the store composition layer binds it.
//!
//! # Single run
//!
//! ```text
//! run(body, overrides)
//!   │
//!   ├─ gate ────────────── debounce / throttle, cancellable
//!   ├─ auto clear, body merge (default < stored < new)
//!   ├─ cache lookup ────── hit: write data, on_success(data, true),
//!   │                           maybe spawn a background revalidation
//!   ├─ status = loading, loading hooks
//!   ├─ build + execute ─── retry loop, each wait cancellable
//!   ├─ convert ────────── converter failure is a CONVERSION_ERROR
//!   ├─ loading delay, then success / error written in one update
//!   └─ on_success | on_error, on_complete, messages
//! ```
//!
//! Cancellation is cooperative: [`Engine::cancel`] fires the store's token
//! (and the current transport handle), then installs a fresh token so the
//! store stays usable. A run that observes its token fired settles with an
//! `is_cancel` result and never reaches the status write.
//!
//! # Module Organization
//!
//! ```text
//! engine/
//! ├── gate    - debounce and throttle
//! └── loading - shared in-flight counter for loading hooks
//! ```

mod gate;
mod loading;

pub use gate::{Gate, ThrottleState, CANCEL_MESSAGE, SUPERSEDED_MESSAGE};
pub use loading::{LoadingGuard, LoadingTracker};

use crate::cache::{create_cache_key, now_millis, CacheEntry};
use crate::config::{ArtConfig, CacheMode, DefaultBody, FetchConfig};
use crate::error::{ArtError, Result};
use crate::pagination::{PageSnapshot, Pager};
use crate::request::{build_request, merge_page_info, RequestDescriptor};
use crate::store::{Store, StoreState};
use crate::transport::{classify_custom_error, CancelHandle, TransportKind};
use crate::types::{Body, OperationResult, Status};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Failure code of results whose converter failed
pub const CONVERSION_ERROR: &str = "CONVERSION_ERROR";

/// Which part of a store a run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// The main request: tracks `status`
    Primary,
    /// Fetch the following page: tracks `is_loading_next_page`
    NextPage,
}

/// Request orchestration for one store.
pub struct Engine {
    descriptor: RequestDescriptor,
    config: FetchConfig,
    art: Arc<ArtConfig>,
    pager: Option<Pager>,
    gate: Gate,
    current: Mutex<Option<CancelHandle>>,
    token: Mutex<CancellationToken>,
    seq: AtomicU64,
}

impl Engine {
    /// Create an engine for `descriptor` with its bound configuration
    pub fn new(
        descriptor: RequestDescriptor,
        config: FetchConfig,
        art: Arc<ArtConfig>,
        pager: Option<Pager>,
    ) -> Self {
        Engine {
            gate: Gate::new(config.debounce, config.throttle),
            descriptor,
            config,
            art,
            pager,
            current: Mutex::new(None),
            token: Mutex::new(CancellationToken::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Bound configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Request descriptor
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Pagination state machine, for paged stores
    pub fn pager(&self) -> Option<&Pager> {
        self.pager.as_ref()
    }

    /// Initial state: pagination fields, initial data, cache seeding
    pub fn seed(&self, state: &mut StoreState) {
        if let Some(pager) = &self.pager {
            pager.init(state);
        }
        if let Some(initial) = &self.config.initial_data {
            let value = initial.resolve();
            state.origin_data = Some(value.clone());
            state.data = Some(value);
        }
        if !self.config.initialize_cache.unwrap_or(false) {
            return;
        }
        let body = self.config.default_body.as_ref().map(DefaultBody::resolve);
        let key = match self.base_cache_key(&self.config, body.as_ref()) {
            Ok(Some(key)) => self.page_key(key, state),
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("cannot seed store from cache: {}", e);
                return;
            }
        };
        if let Some(entry) = self.art.cache().get_fresh(&key, self.config.cache_time) {
            tracing::debug!("store seeded from cache {}", key);
            state.data = Some(entry.data);
            state.body = entry.body.or(body);
            if let Some(pagination) = &entry.pagination {
                pagination.restore(state);
            }
        }
    }

    /// Run one operation and settle with its result.
    ///
    /// The store's cancellation token is captured when this is called, not
    /// when the returned future is first polled, so a `cancel()` issued right
    /// after a spawned run still reaches it.
    ///
    /// `Err` is only returned for configuration mistakes; every runtime
    /// failure settles as an unsuccessful [`OperationResult`].
    pub fn run(
        self: &Arc<Self>,
        store: &Store,
        body: Option<Body>,
        overrides: &FetchConfig,
        mode: RunMode,
    ) -> BoxFuture<'static, Result<OperationResult>> {
        let config = self.config.merge(overrides);
        let token = self.token.lock().clone();
        let engine = Arc::clone(self);
        let store = store.clone();
        async move {
            engine
                .gate
                .pass(&token, || engine.execute(&store, body, config, mode, &token))
                .await
        }
        .boxed()
    }

    /// Re-run the last request bypassing the cache, with status and loading
    /// display off unless the overrides turn them on
    pub fn refresh(self: &Arc<Self>, store: &Store, overrides: &FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        let quiet = FetchConfig {
            status: Some(false),
            loading: Some(false),
            ..Default::default()
        };
        let forced = FetchConfig {
            refresh: Some(true),
            ..Default::default()
        };
        let overrides = quiet.merge(overrides).merge(&forced);
        self.run(store, None, &overrides, RunMode::Primary)
    }

    /// Abort the current request and any gated callers, then go idle
    pub fn cancel(&self, store: &Store, message: Option<&str>) {
        if let Some(handle) = self.current.lock().take() {
            handle.cancel();
        }
        let fired = std::mem::replace(&mut *self.token.lock(), CancellationToken::new());
        fired.cancel();
        tracing::debug!("store {} cancelled: {}", store.key(), message.unwrap_or(CANCEL_MESSAGE));
        if self.config.status_enabled() {
            store.set_status(Status::Idle, None);
        }
        if let Some(pager) = &self.pager {
            store.update_if(|s| {
                if !s.is_loading_next_page {
                    return false;
                }
                pager.apply_failure(s, RunMode::NextPage, true);
                true
            });
        }
    }

    /// Reset data, body and status, and drop the store's cache entry
    pub fn clear(&self, store: &Store) {
        let key = store.read(|s| {
            self.base_cache_key(&self.config, s.body.as_ref())
                .ok()
                .flatten()
                .map(|key| self.page_key(key, s))
        });
        if let Some(key) = key {
            self.art.cache().clear(&key);
        }
        store.update(|s| {
            clear_fields(s);
            if let Some(pager) = &self.pager {
                pager.reset(s);
            }
        });
    }

    fn merge_body(&self, store: &Store, body: Option<Body>, config: &FetchConfig, cleared: bool) -> Option<Body> {
        let stored = if cleared || config.replace_body.unwrap_or(false) {
            None
        } else {
            store.read(|s| s.body.clone())
        };
        let layers = [config.default_body.as_ref().map(DefaultBody::resolve), stored, body];
        layers.into_iter().flatten().reduce(|mut merged, layer| {
            merged.extend(layer);
            merged
        })
    }

    /// Cache key without the page suffix; `Ok(None)` when caching is off
    fn base_cache_key(&self, config: &FetchConfig, body: Option<&Body>) -> Result<Option<String>> {
        let empty = Body::new();
        let body = body.unwrap_or(&empty);
        let suffix = match config.cache_mode() {
            CacheMode::Off => return Ok(None),
            CacheMode::On => None,
            CacheMode::Key(key) => return Ok(Some(create_cache_key(Some(&key), None))),
            CacheMode::ByBody(f) => Some(f(body)),
        };
        let identity = match (&self.descriptor, &suffix) {
            (RequestDescriptor::Path(path), _) => Some(path.clone()),
            (RequestDescriptor::PathFn(f), None) => Some(f(body)),
            (_, Some(_)) => None,
            (RequestDescriptor::Custom(_), None) => {
                return Err(ArtError::Configuration(
                    "a custom request can only be cached with a string key or a key function".into(),
                ))
            }
        };
        Ok(Some(create_cache_key(identity.as_deref(), suffix.as_deref())))
    }

    fn page_key(&self, key: String, state: &StoreState) -> String {
        match &self.pager {
            Some(pager) => format!("{}_{}", key, pager.cache_suffix(state)),
            None => key,
        }
    }

    fn classify(&self, err: &ArtError, kind: TransportKind) -> OperationResult {
        match (kind, &self.art.handle_custom_http_error) {
            (TransportKind::Custom, Some(handle)) if !err.is_cancel() => handle(err),
            (TransportKind::Custom, _) => classify_custom_error(err),
            _ => self.art.transport().classify_error(err, self.art.convert_error.as_ref()),
        }
    }

    async fn execute(
        self: &Arc<Self>,
        store: &Store,
        body: Option<Body>,
        config: FetchConfig,
        mode: RunMode,
        token: &CancellationToken,
    ) -> Result<OperationResult> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let primary = mode == RunMode::Primary;
        let tracks_status = primary && config.status_enabled();

        let auto_clear = config.auto_clear.unwrap_or(false);
        let body = self.merge_body(store, body, &config, auto_clear);
        let base_key = self.base_cache_key(&config, body.as_ref())?;
        store.update(|s| {
            if auto_clear {
                clear_fields(s);
            }
            s.body = body.clone();
        });

        let page = self.pager.as_ref().map(|pager| pager.begin(store, mode));
        let cache_key = base_key.map(|key| store.read(|s| self.page_key(key, s)));

        if let (Some(key), true) = (&cache_key, primary && !config.refresh.unwrap_or(false)) {
            if let Some(entry) = self.art.cache().get_fresh(key, config.cache_time) {
                return Ok(self.serve_cached(store, key, entry, &config));
            }
            tracing::debug!("cache miss for {}", key);
        }

        let _loading = config.loading_enabled().then(|| {
            self.art.loading().begin(
                (config.start_loading.clone(), config.end_loading.clone()),
                (self.art.start_loading.clone(), self.art.end_loading.clone()),
            )
        });
        let started = Instant::now();
        if tracks_status {
            store.update(|s| {
                s.status = Status::Loading;
                s.error = None;
            });
        }

        let mut sent = body.clone();
        if let Some(page) = &page {
            sent = Some(merge_page_info(sent, page, self.art.convert_page.as_ref()));
        }
        if let Some(post_body) = &config.post_body {
            sent = Some(post_body(sent.unwrap_or_default()));
        }
        let options = config.request_options.clone().unwrap_or_default();
        let built = build_request(
            &self.descriptor,
            sent,
            config.method,
            &options,
            None,
            None,
            Arc::clone(self.art.transport()),
        );
        *self.current.lock() = built.call.cancel_handle().cloned();
        let kind = built.kind();
        let call = built.call;

        let convert = config.convert_res.clone().unwrap_or_else(|| self.art.convert_res.clone());
        let check_retry = config.check_retry.clone().or_else(|| self.art.check_retry.clone());
        let mut budget = config.retry_budget();
        let mut attempt = 0u32;

        let mut result = loop {
            attempt += 1;
            let response = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ArtError::Cancelled(CANCEL_MESSAGE.to_string())),
                res = call.execute() => res,
            };
            let err = match response {
                Ok(raw) => match convert(raw, kind).await {
                    Ok(result) => break result,
                    Err(e) => {
                        tracing::warn!("response conversion failed: {}", e);
                        break OperationResult::failure(e.to_string(), Some(CONVERSION_ERROR.to_string()), None);
                    }
                },
                Err(err) => err,
            };

            let result = self.classify(&err, kind);
            if !result.is_cancel {
                if let Some(handle) = &self.art.handle_http_error {
                    handle(&err);
                }
            }
            let vetoed = check_retry.as_ref().is_some_and(|check| !check(&result));
            if result.is_cancel || budget == 0 || vetoed {
                break result;
            }
            budget -= 1;
            let delay = config.retry_delay();
            tracing::warn!("attempt {} failed: {}. Retrying in {:?}", attempt, err, delay);
            tokio::select! {
                _ = token.cancelled() => break OperationResult::cancelled(CANCEL_MESSAGE),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        if tracks_status && !result.is_cancel {
            if let Some(delay) = config.loading_delay {
                let remaining = delay.saturating_sub(started.elapsed());
                if !remaining.is_zero() {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(remaining) => {}
                    }
                }
            }
        }

        if result.is_cancel || token.is_cancelled() {
            if !result.is_cancel {
                result = OperationResult::cancelled(CANCEL_MESSAGE);
            }
            store.update_if(|s| {
                let mut changed = false;
                let latest = self.seq.load(Ordering::SeqCst) == seq;
                // `Engine::cancel` may already have rolled the page back
                if let Some(pager) = &self.pager {
                    if mode == RunMode::NextPage && s.is_loading_next_page && latest {
                        pager.apply_failure(s, mode, true);
                        changed = true;
                    }
                }
                if tracks_status && s.status == Status::Loading && latest {
                    s.status = Status::Idle;
                    changed = true;
                }
                changed
            });
            if let Some(on_complete) = &config.on_complete {
                on_complete(&result);
            }
            return Ok(result);
        }

        let finished_at = now_millis();
        if result.success {
            let origin = result.data.clone();
            let page_data = origin.clone().unwrap_or(Value::Null);
            let post = match &config.post_data {
                Some(post_data) => post_data(page_data),
                None => page_data,
            };
            let shown = match &config.placeholder_data {
                Some(placeholder) if is_empty(&post) => placeholder.resolve(),
                _ => post.clone(),
            };

            store.update(|s| {
                if config.writes_data() {
                    let data = match &self.pager {
                        Some(pager) => pager.page_data(s, shown.clone(), mode),
                        None => shown.clone(),
                    };
                    s.origin_data = origin;
                    if s.data.as_ref() != Some(&data) {
                        s.data = Some(data);
                    }
                }
                if let Some(pager) = &self.pager {
                    pager.apply_success(s, &result, result.data.as_ref());
                }
                s.last_request_time = Some(finished_at);
                if tracks_status {
                    s.status = Status::Success;
                    s.error = None;
                }
            });
            result.data = Some(post);

            if let (Some(key), true) = (&cache_key, primary) {
                let entry = store.read(|s| {
                    CacheEntry::new(
                        s.data.clone().unwrap_or(Value::Null),
                        body.clone(),
                        PageSnapshot::capture(s).filter(|_| self.pager.is_some()),
                    )
                });
                tracing::debug!("cache {} written", key);
                self.art.cache().set(key, entry);
            }
        } else {
            let error = result.error_info();
            store.update(|s| {
                s.last_request_time = Some(finished_at);
                if let Some(pager) = &self.pager {
                    pager.apply_failure(s, mode, false);
                }
                if tracks_status {
                    s.status = Status::Error;
                    s.error = Some(error.clone());
                } else if mode == RunMode::NextPage {
                    s.error = Some(error.clone());
                }
            });
        }

        self.dispatch(&config, &mut result);
        Ok(result)
    }

    fn serve_cached(self: &Arc<Self>, store: &Store, key: &str, entry: CacheEntry, config: &FetchConfig) -> OperationResult {
        tracing::debug!("cache hit for {} (age {:?})", key, entry.age());
        store.update(|s| {
            if config.writes_data() && s.data.as_ref() != Some(&entry.data) {
                s.data = Some(entry.data.clone());
            }
            if let Some(body) = &entry.body {
                if s.body.as_ref() != Some(body) {
                    s.body = Some(body.clone());
                }
            }
            if let Some(pagination) = &entry.pagination {
                pagination.restore(s);
            }
            if config.status_enabled() {
                s.status = Status::Success;
                s.error = None;
            }
        });

        let mut result = OperationResult::ok(entry.data.clone());
        if let Some(pagination) = &entry.pagination {
            result.total = Some(pagination.total);
        }
        if let Some(on_success) = &config.on_success {
            on_success(&entry.data, true);
        }
        if let Some(on_complete) = &config.on_complete {
            on_complete(&result);
        }

        if config.revalidate.is_some_and(|after| entry.age() >= after) {
            tracing::debug!("cache {} is stale, revalidating in the background", key);
            let overrides = FetchConfig {
                status: Some(config.cache_status.unwrap_or(false)),
                loading: Some(config.cache_loading.unwrap_or(config.loading_enabled())),
                refresh: Some(true),
                ..Default::default()
            };
            let revalidation = self.run(store, None, &overrides, RunMode::Primary);
            tokio::spawn(async move {
                if let Err(e) = revalidation.await {
                    tracing::warn!("background revalidation failed: {}", e);
                }
            });
        }
        result
    }

    fn dispatch(&self, config: &FetchConfig, result: &mut OperationResult) {
        if result.success {
            if let Some(on_success) = &config.on_success {
                on_success(result.data.as_ref().unwrap_or(&Value::Null), false);
            }
        } else if let Some(on_error) = &config.on_error {
            on_error(result);
        }
        if let Some(on_complete) = &config.on_complete {
            on_complete(result);
        }

        if result.success && config.shows_success() {
            if let Some(show) = &self.art.show_success_message {
                if let Some(message) = &config.success_message {
                    result.message = Some(message.clone());
                }
                show(result);
            }
        } else if !result.success && config.shows_error() {
            if let Some(show) = &self.art.show_error_message {
                if let Some(message) = &config.error_message {
                    result.message = Some(message.clone());
                }
                show(result);
            }
        }
    }
}

fn clear_fields(s: &mut StoreState) {
    s.data = None;
    s.origin_data = None;
    s.body = None;
    s.error = None;
    s.status = Status::Idle;
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
