//! Classic paged stores.
//!
//! `current` and `pageSize` are merged into every request body (or encoded
//! by the configured page converter). Changing the page with
//! [`PageStore::set_page`] does not fetch; [`PageStore::set_page_query`]
//! changes it and fetches.

use super::{body_arg, run_method, settle, FetchStore};
use crate::config::FetchConfig;
use crate::engine::{Engine, RunMode};
use crate::error::Result;
use crate::pagination::PageChange;
use crate::store::{Fragment, Store};
use crate::types::{Body, OperationResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;
use tokio::task::JoinHandle;

fn page_change(args: &Value) -> PageChange {
    let field = |name: &str| args.get(name).and_then(Value::as_u64).map(|v| v as u32);
    PageChange {
        current: field("current"),
        page_size: field("pageSize"),
    }
}

/// Store for page-number pagination.
#[derive(Clone)]
pub struct PageStore {
    inner: FetchStore,
}

impl PageStore {
    pub(super) fn build(engine: Arc<Engine>) -> Self {
        let set = Arc::clone(&engine);
        let set_query = Arc::clone(&engine);
        let kind = Fragment::new()
            .method("query", run_method(&engine, RunMode::Primary))
            .method("set_page", move |store: Store, args| {
                if let Some(pager) = set.pager() {
                    pager.set_page(&store, page_change(&args));
                }
                async { Ok(Value::Null) }.boxed()
            })
            .method("set_page_query", move |store: Store, args| {
                if let Some(pager) = set_query.pager() {
                    pager.set_page(&store, page_change(&args));
                }
                let pending = body_arg(args.get("body").unwrap_or(&Value::Null))
                    .map(|body| set_query.run(&store, body, &FetchConfig::default(), RunMode::Primary));
                settle(pending)
            });
        PageStore {
            inner: FetchStore::build(engine, kind),
        }
    }

    /// Query the current page
    pub fn query(&self, body: Option<Body>) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run(body)
    }

    /// Query the current page with per-call overrides
    pub fn query_with(&self, body: Option<Body>, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run_with(body, overrides)
    }

    /// Fire-and-forget [`PageStore::query`]
    pub fn spawn_query(&self, body: Option<Body>) -> JoinHandle<Result<OperationResult>> {
        self.inner.spawn_run(body)
    }

    /// Change page index and/or size without fetching
    pub fn set_page(&self, change: PageChange) {
        if let Some(pager) = self.engine().pager() {
            pager.set_page(self.store(), change);
        }
    }

    /// Change the page, then fetch it
    pub fn set_page_query(&self, change: PageChange) -> BoxFuture<'static, Result<OperationResult>> {
        self.set_page_query_with(change, FetchConfig::default())
    }

    /// Change the page, then fetch it with per-call overrides
    pub fn set_page_query_with(&self, change: PageChange, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.set_page(change);
        self.inner.run_with(None, overrides)
    }

    /// Fire-and-forget [`PageStore::set_page_query`]
    pub fn spawn_set_page_query(&self, change: PageChange) -> JoinHandle<Result<OperationResult>> {
        tokio::spawn(self.set_page_query(change))
    }
}

impl Deref for PageStore {
    type Target = FetchStore;

    fn deref(&self) -> &FetchStore {
        &self.inner
    }
}
