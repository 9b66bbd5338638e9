#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Module Structure
//!
//! - **[types]** - `OperationResult`, status, raw responses, methods
//! - **[error]** - Error taxonomy and result alias
//! - **[config]** - Process-wide `ArtConfig` and layered per-store `FetchConfig`
//! - **[cache]** - Shared response cache with optional persistent backing
//! - **[transport]** - Plain and interceptor HTTP transports, cancel handles
//! - **[request]** - Request descriptors and the request builder
//! - **[store]** - Observable store and fragment composition
//! - **[engine]** - Execution engine: gating, retry, conversion, dispatch
//! - **[pagination]** - Page and cursor bookkeeping
//! - **[stores]** - `ArtClient` and the query, mutation, page and infinite stores
//! - **[hooks]** - Mount, polling, focus and unmount binding for UI frameworks

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod pagination;
pub mod request;
pub mod store;
pub mod stores;
pub mod transport;
pub mod types;

pub use config::{ArtConfig, ArtSettings, CacheMode, FetchConfig};
pub use error::{ArtError, Result};
pub use pagination::PageChange;
pub use request::RequestDescriptor;
pub use store::{Store, StoreState};
pub use stores::{ArtClient, FetchStore, InfiniteStore, MutationStore, PageStore, QueryStore};
pub use types::{Body, ErrorInfo, Method, OperationResult, Status};
