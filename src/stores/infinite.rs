//! Infinite and cursor-paged stores.
//!
//! A primary query restarts at page one. [`InfiniteStore::query_next_page`]
//! advances `current`, sends that page's token, and either replaces `data`
//! or appends to it (`infinite: true`). Next-page progress is tracked by
//! `is_loading_next_page` / `is_error_next_page`, leaving `status` alone so
//! a visible list is never blanked.

use super::{run_method, FetchStore};
use crate::config::FetchConfig;
use crate::engine::{Engine, RunMode};
use crate::error::Result;
use crate::store::Fragment;
use crate::types::{Body, OperationResult};
use futures::future::BoxFuture;
use std::ops::Deref;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Store for cursor pagination and infinite lists.
#[derive(Clone)]
pub struct InfiniteStore {
    inner: FetchStore,
}

impl InfiniteStore {
    pub(super) fn build(engine: Arc<Engine>) -> Self {
        let kind = Fragment::new()
            .method("query", run_method(&engine, RunMode::Primary))
            .method("query_next_page", run_method(&engine, RunMode::NextPage));
        InfiniteStore {
            inner: FetchStore::build(engine, kind),
        }
    }

    /// Load the first page
    pub fn query(&self, body: Option<Body>) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run(body)
    }

    /// Load the first page with per-call overrides
    pub fn query_with(&self, body: Option<Body>, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run_with(body, overrides)
    }

    /// Fire-and-forget [`InfiniteStore::query`]
    pub fn spawn_query(&self, body: Option<Body>) -> JoinHandle<Result<OperationResult>> {
        self.inner.spawn_run(body)
    }

    /// Load the page after `current`
    pub fn query_next_page(&self, body: Option<Body>) -> BoxFuture<'static, Result<OperationResult>> {
        self.query_next_page_with(body, FetchConfig::default())
    }

    /// Load the next page with per-call overrides
    pub fn query_next_page_with(&self, body: Option<Body>, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.engine().run(self.store(), body, &overrides, RunMode::NextPage)
    }

    /// Fire-and-forget [`InfiniteStore::query_next_page`]
    pub fn spawn_query_next_page(&self, body: Option<Body>) -> JoinHandle<Result<OperationResult>> {
        tokio::spawn(self.query_next_page(body))
    }
}

impl Deref for InfiniteStore {
    type Target = FetchStore;

    fn deref(&self) -> &FetchStore {
        &self.inner
    }
}
