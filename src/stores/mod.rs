//! Store types and the client that builds them.
//!
//! Every store is an [`Engine`] plus a [`ComposedStore`] assembled from
//! fragments: a shared core fragment (`run`, `refresh`, `cancel`, `clear`,
//! `set_body`) followed by the fragment of the store kind, so kind-specific
//! methods and state win on collision.
//!
//! | Store | Built by | Kind methods |
//! |-------|----------|--------------|
//! | [`QueryStore`] | [`ArtClient::make_query`] | `query` |
//! | [`MutationStore`] | [`ArtClient::make_mutation`] | `mutate` |
//! | [`PageStore`] | [`ArtClient::make_page`] | `query`, `set_page`, `set_page_query` |
//! | [`InfiniteStore`] | [`ArtClient::make_infinite`] | `query`, `query_next_page` |
//!
//! Construction is synchronous and performs no I/O. Operations return a
//! boxed future that is already bound to the store's current cancellation
//! token, so a `cancel()` issued after the call and before the first poll
//! still aborts it. Every operation has a `spawn_*` counterpart that runs it
//! on the tokio runtime and returns the [`JoinHandle`].
//!
//! # Examples
//!
//! ```no_run
//! use art_fetch::{ArtClient, ArtConfig, FetchConfig};
//! use art_fetch::config::CacheMode;
//!
//! # async fn demo() -> art_fetch::Result<()> {
//! let client = ArtClient::new(ArtConfig::builder().base_url("https://api.example.com").build());
//! let users = client.make_query("/users", FetchConfig {
//!     cache: Some(CacheMode::On),
//!     ..Default::default()
//! });
//!
//! let res = users.query(None).await?;
//! if res.success {
//!     println!("{:?}", users.state().data);
//! }
//! # Ok(())
//! # }
//! ```

mod infinite;
mod mutation;
mod page;
mod query;

pub use infinite::InfiniteStore;
pub use mutation::MutationStore;
pub use page::PageStore;
pub use query::QueryStore;

use crate::config::{ArtConfig, FetchConfig};
use crate::engine::{Engine, RunMode};
use crate::error::{ArtError, Result};
use crate::pagination::Pager;
use crate::request::RequestDescriptor;
use crate::store::{compose, ComposedStore, Fragment, Store, StoreState};
use crate::types::{Body, OperationResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

/// Builds stores sharing one process-wide configuration.
#[derive(Clone, Debug, Default)]
pub struct ArtClient {
    art: Arc<ArtConfig>,
}

impl ArtClient {
    /// Create a client owning `art`
    pub fn new(art: ArtConfig) -> Self {
        ArtClient { art: Arc::new(art) }
    }

    /// Create a client from a shared configuration
    pub fn with_shared(art: Arc<ArtConfig>) -> Self {
        ArtClient { art }
    }

    /// Process-wide configuration
    pub fn config(&self) -> &Arc<ArtConfig> {
        &self.art
    }

    /// Build a query store
    pub fn make_query(&self, descriptor: impl Into<RequestDescriptor>, config: FetchConfig) -> QueryStore {
        let config = FetchConfig::query_defaults().merge(&config);
        QueryStore::build(self.engine(descriptor.into(), config, None))
    }

    /// Build a mutation store
    pub fn make_mutation(&self, descriptor: impl Into<RequestDescriptor>, config: FetchConfig) -> MutationStore {
        let config = FetchConfig::mutation_defaults().merge(&config);
        MutationStore::build(self.engine(descriptor.into(), config, None))
    }

    /// Build a classic paged store
    pub fn make_page(&self, descriptor: impl Into<RequestDescriptor>, config: FetchConfig) -> PageStore {
        let config = FetchConfig::page_defaults().merge(&config);
        let pager = Pager::classic(&config);
        PageStore::build(self.engine(descriptor.into(), config, Some(pager)))
    }

    /// Build an infinite (cursor) store
    pub fn make_infinite(&self, descriptor: impl Into<RequestDescriptor>, config: FetchConfig) -> InfiniteStore {
        let config = FetchConfig::infinite_defaults().merge(&config);
        let pager = Pager::infinite(&config);
        InfiniteStore::build(self.engine(descriptor.into(), config, Some(pager)))
    }

    fn engine(&self, descriptor: RequestDescriptor, config: FetchConfig, pager: Option<Pager>) -> Arc<Engine> {
        Arc::new(Engine::new(descriptor, config, Arc::clone(&self.art), pager))
    }
}

/// Operations shared by every store kind.
#[derive(Clone)]
pub struct FetchStore {
    engine: Arc<Engine>,
    composed: ComposedStore,
}

impl FetchStore {
    fn build(engine: Arc<Engine>, kind: Fragment) -> Self {
        let composed = compose(vec![core_fragment(&engine), kind]);
        FetchStore { engine, composed }
    }

    /// Run with the stored body merged with `body`
    pub fn run(&self, body: Option<Body>) -> BoxFuture<'static, Result<OperationResult>> {
        self.run_with(body, FetchConfig::default())
    }

    /// Run with per-call overrides
    pub fn run_with(&self, body: Option<Body>, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.engine.run(self.store(), body, &overrides, RunMode::Primary)
    }

    /// Fire-and-forget [`FetchStore::run`]
    pub fn spawn_run(&self, body: Option<Body>) -> JoinHandle<Result<OperationResult>> {
        tokio::spawn(self.run(body))
    }

    /// Re-run the last request, bypassing the cache
    pub fn refresh(&self) -> BoxFuture<'static, Result<OperationResult>> {
        self.refresh_with(FetchConfig::default())
    }

    /// Refresh with per-call overrides (e.g. `status: Some(true)`)
    pub fn refresh_with(&self, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.engine.refresh(self.store(), &overrides)
    }

    /// Fire-and-forget [`FetchStore::refresh`]
    pub fn spawn_refresh(&self) -> JoinHandle<Result<OperationResult>> {
        tokio::spawn(self.refresh())
    }

    /// Cancel in-flight and gated work; status returns to idle
    pub fn cancel(&self, message: Option<&str>) {
        self.engine.cancel(self.store(), message);
    }

    /// Reset data, body and status, and drop the cache entry
    pub fn clear(&self) {
        self.engine.clear(self.store());
    }

    /// Merge `partial` into the stored body (new fields win), or replace it
    pub fn set_body(&self, partial: Body, replace: bool) {
        set_body(self.store(), partial, replace);
    }

    /// Snapshot of the current state
    pub fn state(&self) -> StoreState {
        self.store().get()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.store().subscribe()
    }

    /// State changes as a stream
    pub fn changes(&self) -> WatchStream<StoreState> {
        self.store().changes()
    }

    /// The observable store
    pub fn store(&self) -> &Store {
        self.composed.store()
    }

    /// The store with its bound method table
    pub fn composed(&self) -> &ComposedStore {
        &self.composed
    }

    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

fn set_body(store: &Store, partial: Body, replace: bool) {
    store.update(|s| match s.body.as_mut() {
        Some(body) if !replace => body.extend(partial),
        _ => s.body = Some(partial),
    });
}

/// Body argument of a composed method: `null` or an object
pub(crate) fn body_arg(args: &Value) -> Result<Option<Body>> {
    match args {
        Value::Null => Ok(None),
        Value::Object(body) => Ok(Some(body.clone())),
        other => Err(ArtError::Configuration(format!("request body must be a JSON object, got {}", other))),
    }
}

pub(crate) fn to_value(result: Result<OperationResult>) -> Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

/// Store-first method running the engine in `mode`
pub(crate) fn run_method(
    engine: &Arc<Engine>,
    mode: RunMode,
) -> impl Fn(Store, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
    let engine = Arc::clone(engine);
    move |store, args| {
        let pending = body_arg(&args).map(|body| engine.run(&store, body, &FetchConfig::default(), mode));
        settle(pending)
    }
}

/// JSON result of a run started by a composed method
pub(crate) fn settle(pending: Result<BoxFuture<'static, Result<OperationResult>>>) -> BoxFuture<'static, Result<Value>> {
    async move { to_value(pending?.await) }.boxed()
}

fn core_fragment(engine: &Arc<Engine>) -> Fragment {
    let seed = Arc::clone(engine);
    let refresh = Arc::clone(engine);
    let cancel = Arc::clone(engine);
    let clear = Arc::clone(engine);

    Fragment::new()
        .state(move |s| seed.seed(s))
        .method("run", run_method(engine, RunMode::Primary))
        .method("refresh", move |store, _args| settle(Ok(refresh.refresh(&store, &FetchConfig::default()))))
        .method("cancel", move |store, args| {
            cancel.cancel(&store, args.as_str());
            async { Ok(Value::Null) }.boxed()
        })
        .method("clear", move |store, _args| {
            clear.clear(&store);
            async { Ok(Value::Null) }.boxed()
        })
        .method("set_body", |store, args| {
            async move {
                let body = body_arg(args.get("body").unwrap_or(&Value::Null))?.unwrap_or_default();
                let replace = args.get("replace").and_then(Value::as_bool).unwrap_or(false);
                set_body(&store, body, replace);
                Ok(Value::Null)
            }
            .boxed()
        })
}
