//! Mutation stores: writes that report success and error messages by default.

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

/// Store for write requests.
#[derive(Clone)]
pub struct MutationStore {
    inner: FetchStore,
}

impl MutationStore {
    pub(super) fn build(engine: Arc<Engine>) -> Self {
        let kind = Fragment::new().method("mutate", run_method(&engine, RunMode::Primary));
        MutationStore {
            inner: FetchStore::build(engine, kind),
        }
    }

    /// Send the mutation
    pub fn mutate(&self, body: Option<Body>) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run(body)
    }

    /// Send the mutation with per-call overrides
    pub fn mutate_with(&self, body: Option<Body>, overrides: FetchConfig) -> BoxFuture<'static, Result<OperationResult>> {
        self.inner.run_with(body, overrides)
    }

    /// Fire-and-forget [`MutationStore::mutate`]
    pub fn spawn_mutate(&self, body: Option<Body>) -> JoinHandle<Result<OperationResult>> {
        self.inner.spawn_run(body)
    }
}

impl Deref for MutationStore {
    type Target = FetchStore;

    fn deref(&self) -> &FetchStore {
        &self.inner
    }
}
