//! Observable store primitive.
//!
//! A [`Store`] is a cheaply cloneable handle over a `tokio::sync::watch`
//! channel holding one [`StoreState`]. Reads are synchronous snapshots;
//! [`Store::update`] applies a multi-field patch and notifies subscribers
//! exactly once.
//!
//! ```text
//!            update(|s| { .. })
//! engine ───────────────────────► watch::Sender<StoreState>
//!                                        │
//!                     ┌──────────────────┼─────────────────┐
//!                     ▼                  ▼                 ▼
//!                 get()/read()      subscribe()        changes()
//!                  snapshot       watch::Receiver     WatchStream
//! ```
//!
//! # Examples
//!
//! ```
//! use art_fetch::store::{Store, StoreState};
//! use art_fetch::types::Status;
//!
//! let store = Store::new(StoreState::default());
//! let rx = store.subscribe();
//! store.update(|s| {
//!     s.status = Status::Success;
//!     s.data = Some(serde_json::json!([1, 2]));
//! });
//! assert!(rx.has_changed().unwrap());
//! assert!(store.get().is_success());
//! ```

pub mod compose;

pub use compose::{compose, ComposedStore, Fragment, MethodFn};

use crate::types::{Body, ErrorInfo, Status};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Everything a store exposes to its consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// Unique store identity
    pub key: String,
    /// Lifecycle status
    pub status: Status,
    /// Last request payload
    pub body: Option<Body>,
    /// Post-transform result
    pub data: Option<Value>,
    /// Pre-transform result
    pub origin_data: Option<Value>,
    /// Last failure
    pub error: Option<ErrorInfo>,
    /// When the last request settled, milliseconds since the Unix epoch
    pub last_request_time: Option<u64>,
    /// Current page (paged stores)
    pub current: Option<u32>,
    /// Page size (paged stores)
    pub page_size: Option<u32>,
    /// Total items reported by the server
    pub total: u64,
    /// Cursor per page; index 0 is page 1
    pub page_tokens: Vec<Option<String>>,
    /// Whether another page may exist
    pub has_next_page: bool,
    /// A next-page fetch is in flight
    pub is_loading_next_page: bool,
    /// The last next-page fetch failed
    pub is_error_next_page: bool,
    /// Fields contributed by extra fragments
    pub extra: Body,
}

impl Default for StoreState {
    fn default() -> Self {
        StoreState {
            key: uuid::Uuid::new_v4().to_string(),
            status: Status::Idle,
            body: None,
            data: None,
            origin_data: None,
            error: None,
            last_request_time: None,
            current: None,
            page_size: None,
            total: 0,
            page_tokens: Vec::new(),
            has_next_page: false,
            is_loading_next_page: false,
            is_error_next_page: false,
            extra: Body::new(),
        }
    }
}

impl StoreState {
    /// `status == Loading`
    pub fn is_loading(&self) -> bool {
        self.status == Status::Loading
    }

    /// `status == Error`
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// `status == Success`
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// `status == Idle`
    pub fn is_idle(&self) -> bool {
        self.status == Status::Idle
    }

    /// Decode `data` into a concrete type
    pub fn data_as<T: DeserializeOwned>(&self) -> crate::Result<Option<T>> {
        match &self.data {
            Some(data) => Ok(Some(serde_json::from_value(data.clone())?)),
            None => Ok(None),
        }
    }
}

/// Observable store handle. Clones share the same state.
#[derive(Clone)]
pub struct Store {
    tx: Arc<watch::Sender<StoreState>>,
}

impl Store {
    /// Create a store holding `initial`
    pub fn new(initial: StoreState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Store { tx: Arc::new(tx) }
    }

    /// Snapshot of the current state
    pub fn get(&self) -> StoreState {
        self.tx.borrow().clone()
    }

    /// Read through a closure without cloning the whole state
    pub fn read<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Apply a patch atomically; subscribers are notified once
    pub fn update(&self, f: impl FnOnce(&mut StoreState)) {
        self.tx.send_modify(f);
    }

    /// Apply a patch, notifying only when `f` reports a change
    pub fn update_if(&self, f: impl FnOnce(&mut StoreState) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Set status (and error) when it differs from the current one
    pub fn set_status(&self, status: Status, error: Option<ErrorInfo>) {
        self.update_if(|s| {
            if s.status == status && s.error == error {
                return false;
            }
            s.status = status;
            s.error = error;
            true
        });
    }

    /// New receiver positioned at the current state
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.tx.subscribe()
    }

    /// Stream of states, starting with the current one
    pub fn changes(&self) -> WatchStream<StoreState> {
        WatchStream::new(self.subscribe())
    }

    /// Store identity
    pub fn key(&self) -> String {
        self.read(|s| s.key.clone())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.read(|s| f.debug_struct("Store").field("key", &s.key).field("status", &s.status).finish())
    }
}
