//! Lifecycle binding for UI frameworks.
//!
//! [`Lifecycle`] wires a [`ComposedStore`] to the events a view goes
//! through, using only the store's `run`, `refresh` and `cancel` methods:
//!
//! | Event | Effect |
//! |-------|--------|
//! | mount | `run` unless `manual` (submit-style stores default to manual) |
//! | every `polling_interval` | `run` |
//! | window regains visibility | `run` or `refresh` when `refresh_on_window_focus` and the last request is older than `focus_timespan` |
//! | unmount | stop polling, `cancel` (the cache is kept) |
//!
//! # Examples
//!
//! ```no_run
//! use art_fetch::hooks::{HookOptions, Lifecycle, StoreRole};
//! use art_fetch::{ArtClient, FetchConfig};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let client = ArtClient::default();
//! let feed = client.make_query("/feed", FetchConfig::default());
//! let lifecycle = Lifecycle::mount(feed.composed(), StoreRole::Query, HookOptions {
//!     polling_interval: Some(Duration::from_secs(30)),
//!     refresh_on_window_focus: true,
//!     ..Default::default()
//! });
//! lifecycle.on_visibility_change(true);
//! lifecycle.unmount().await;
//! # }
//! ```

use crate::cache::now_millis;
use crate::store::ComposedStore;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Whether the bound store reads or submits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// Runs on mount by default
    Query,
    /// Manual by default
    Submit,
}

/// What a focus refresh invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusMode {
    /// `run`: normal status display, cache honoured
    Run,
    /// `refresh`: quiet, cache bypassed
    #[default]
    Refresh,
}

/// Lifecycle options
#[derive(Debug, Clone, Default)]
pub struct HookOptions {
    /// Skip the run on mount; `None` follows the store role
    pub manual: Option<bool>,
    /// Re-run periodically
    pub polling_interval: Option<Duration>,
    /// Re-fetch when the window becomes visible again
    pub refresh_on_window_focus: bool,
    /// Method used for focus re-fetches
    pub focus_mode: FocusMode,
    /// Minimum age of the last request before a focus re-fetch
    pub focus_timespan: Duration,
}

/// A mounted store binding. Dropping it stops polling.
pub struct Lifecycle {
    composed: ComposedStore,
    options: HookOptions,
    polling: CancellationToken,
}

fn invoke(composed: &ComposedStore, method: &'static str) -> JoinHandle<()> {
    let pending = composed.call(method, Value::Null);
    tokio::spawn(async move {
        if let Err(e) = pending.await {
            tracing::warn!("lifecycle `{}` failed: {}", method, e);
        }
    })
}

impl Lifecycle {
    /// Bind to `composed`: run unless manual and start polling
    pub fn mount(composed: &ComposedStore, role: StoreRole, options: HookOptions) -> Self {
        let manual = options.manual.unwrap_or(role == StoreRole::Submit);
        if !manual {
            invoke(composed, "run");
        }

        let polling = CancellationToken::new();
        if let Some(period) = options.polling_interval.filter(|p| !p.is_zero()) {
            let composed = composed.clone();
            let stop = polling.clone();
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticks.tick() => {
                            if let Err(e) = composed.call("run", Value::Null).await {
                                tracing::warn!("polling run failed: {}", e);
                            }
                        }
                    }
                }
                tracing::debug!("polling stopped");
            });
        }

        Lifecycle {
            composed: composed.clone(),
            options,
            polling,
        }
    }

    /// Report a visibility change; returns the re-fetch task when one starts
    pub fn on_visibility_change(&self, visible: bool) -> Option<JoinHandle<()>> {
        if !visible || !self.options.refresh_on_window_focus {
            return None;
        }
        let last = self.composed.store().read(|s| s.last_request_time);
        let timespan = self.options.focus_timespan.as_millis() as u64;
        if last.is_some_and(|t| now_millis().saturating_sub(t) <= timespan) {
            return None;
        }
        let method = match self.options.focus_mode {
            FocusMode::Run => "run",
            FocusMode::Refresh => "refresh",
        };
        Some(invoke(&self.composed, method))
    }

    /// Stop polling and cancel in-flight work
    pub async fn unmount(self) {
        self.polling.cancel();
        if let Err(e) = self.composed.call("cancel", Value::Null).await {
            tracing::warn!("lifecycle cancel failed: {}", e);
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.polling.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{compose, Fragment, Store};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_store() -> (ComposedStore, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (r, f) = (Arc::clone(&runs), Arc::clone(&refreshes));
        let fragment = Fragment::new()
            .method("run", move |store: Store, _| {
                r.fetch_add(1, Ordering::SeqCst);
                store.update(|s| s.last_request_time = Some(now_millis()));
                async { Ok(Value::Null) }.boxed()
            })
            .method("refresh", move |_, _| {
                f.fetch_add(1, Ordering::SeqCst);
                async { Ok(Value::Null) }.boxed()
            })
            .method("cancel", |_, _| async { Ok(Value::Null) }.boxed());
        (compose(vec![fragment]), runs, refreshes)
    }

    #[tokio::test]
    async fn test_mount_runs_unless_manual() {
        let (composed, runs, _) = counting_store();
        Lifecycle::mount(&composed, StoreRole::Query, HookOptions::default())
            .unmount()
            .await;
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let (composed, runs, _) = counting_store();
        let lifecycle = Lifecycle::mount(&composed, StoreRole::Submit, HookOptions::default());
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        drop(lifecycle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_until_unmount() {
        let (composed, runs, _) = counting_store();
        let options = HookOptions {
            manual: Some(true),
            polling_interval: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        let lifecycle = Lifecycle::mount(&composed, StoreRole::Query, options);
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        lifecycle.unmount().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_focus_refresh_respects_timespan() {
        let (composed, _, refreshes) = counting_store();
        let options = HookOptions {
            manual: Some(true),
            refresh_on_window_focus: true,
            focus_timespan: Duration::from_secs(60),
            ..Default::default()
        };
        let lifecycle = Lifecycle::mount(&composed, StoreRole::Query, options);

        // never requested: refresh
        lifecycle.on_visibility_change(true).unwrap().await.unwrap();
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert!(lifecycle.on_visibility_change(false).is_none());

        composed.call("run", Value::Null).await.unwrap();
        // requested just now: too recent
        assert!(lifecycle.on_visibility_change(true).is_none());
    }
}
