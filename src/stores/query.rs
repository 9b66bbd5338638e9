//! Query stores: reads, cached by default configuration when asked.

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

/// Store for read requests.
#[derive(Clone)]
pub struct QueryStore {
    inner: FetchStore,
}

impl QueryStore {
    pub(super) fn build(engine: Arc<Engine>) -> Self {
        let kind = Fragment::new().method("query", run_method(&engine, RunMode::Primary));
        QueryStore {
            inner: FetchStore::build(engine, kind),
        }
    }

    /// Query with `body` merged over the stored body
    pub fn query(&self, body: Option<Body>) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run(body)
    }

    /// Query with per-call overrides
    pub fn query_with(&self, body: Option<Body>, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run_with(body, overrides)
    }

    /// Fire-and-forget [`QueryStore::query`]
    pub fn spawn_query(&self, body: Option<Body>) -> JoinHandle<Result<OperationResult>> {
        self.inner.spawn_run(body)
    }
}

impl Deref for QueryStore {
    type Target = FetchStore;

    fn deref(&self) -> &FetchStore {
        &self.inner
    }
}
