//! Store composition.
//!
//! Stores are assembled from ordered [`Fragment`]s. Each fragment contributes
//! state initializers and store-first methods. [`compose`] runs in two
//! phases:
//!
//! 1. every state initializer is applied in fragment order to one
//!    [`StoreState`] (later fragments overwrite earlier ones), and the
//!    [`Store`] is created from the result;
//! 2. the method tables are merged (later names win) and each method is bound
//!    to the live store, so callers invoke it without passing the store.
//!
//! Because the store exists before any method is bound, no lazy getter is
//! needed to break the cycle between methods and the store they mutate.
//!
//! # Examples
//!
//! ```
//! use art_fetch::store::{compose, Fragment};
//! use futures::FutureExt;
//! use serde_json::{json, Value};
//!
//! # tokio_test::block_on(async {
//! let counter = Fragment::new()
//!     .state(|s| { s.extra.insert("count".into(), json!(0)); })
//!     .method("increment", |store, _args| async move {
//!         let mut next = 0;
//!         store.update(|s| {
//!             next = s.extra["count"].as_i64().unwrap_or(0) + 1;
//!             s.extra.insert("count".into(), json!(next));
//!         });
//!         Ok(json!(next))
//!     }.boxed());
//!
//! let composed = compose(vec![counter]);
//! assert_eq!(composed.call("increment", Value::Null).await.unwrap(), json!(1));
//! # });
//! ```

use super::{Store, StoreState};
use crate::error::{ArtError, Result};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A store-first method: receives the live store and its arguments
pub type MethodFn = Arc<dyn Fn(Store, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

type StateInit = Arc<dyn Fn(&mut StoreState) + Send + Sync>;

/// One state-and-methods contribution to a store.
#[derive(Clone, Default)]
pub struct Fragment {
    state: Vec<StateInit>,
    methods: Vec<(String, MethodFn)>,
}

impl Fragment {
    /// Empty fragment
    pub fn new() -> Self {
        Fragment::default()
    }

    /// Add a state initializer
    pub fn state<F>(mut self, init: F) -> Self
    where
        F: Fn(&mut StoreState) + Send + Sync + 'static,
    {
        self.state.push(Arc::new(init));
        self
    }

    /// Add a store-first method
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Store, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(method)));
        self
    }
}

/// A store together with its bound methods.
#[derive(Clone)]
pub struct ComposedStore {
    store: Store,
    methods: Arc<HashMap<String, MethodFn>>,
}

impl ComposedStore {
    /// The underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Invoke a bound method.
    ///
    /// The method runs its synchronous part immediately; the returned future
    /// only settles it.
    pub fn call(&self, name: &str, args: Value) -> BoxFuture<'static, Result<Value>> {
        match self.methods.get(name) {
            Some(method) => method(self.store.clone(), args),
            None => future::ready(Err(ArtError::UnknownMethod(name.to_string()))).boxed(),
        }
    }

    /// Whether a method is registered under `name`
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Merge fragments into one store.
pub fn compose(fragments: Vec<Fragment>) -> ComposedStore {
    let mut state = StoreState::default();
    for init in fragments.iter().flat_map(|f| f.state.iter()) {
        init(&mut state);
    }
    let store = Store::new(state);

    let mut methods = HashMap::new();
    for (name, method) in fragments.into_iter().flat_map(|f| f.methods) {
        if methods.insert(name.clone(), method).is_some() {
            tracing::debug!("store method `{}` overridden by a later fragment", name);
        }
    }

    ComposedStore {
        store,
        methods: Arc::new(methods),
    }
}
