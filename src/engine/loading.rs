//! Shared in-flight counter for loading indicators.

use crate::config::Hook;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts loading-tracked calls across every store of one configuration.
///
/// Global hooks fire on the 0 → 1 and 1 → 0 edges only, so concurrent
/// calls show a single indicator. Per-store hooks fire on every call.
#[derive(Debug, Default)]
pub struct LoadingTracker {
    in_flight: AtomicUsize,
}

impl LoadingTracker {
    /// Number of tracked calls in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register a call; the returned guard ends it on drop
    pub fn begin(
        self: &Arc<Self>,
        local: (Option<Hook>, Option<Hook>),
        global: (Option<Hook>, Option<Hook>),
    ) -> LoadingGuard {
        let (local_start, local_end) = local;
        let (global_start, global_end) = global;
        let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
        match (&local_start, &global_start) {
            (Some(start), _) => start(),
            (None, Some(start)) if previous == 0 => start(),
            _ => {}
        }
        LoadingGuard {
            tracker: Arc::clone(self),
            local_end,
            global_end,
        }
    }
}

/// Ends one tracked call when dropped.
pub struct LoadingGuard {
    tracker: Arc<LoadingTracker>,
    local_end: Option<Hook>,
    global_end: Option<Hook>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let previous = self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        match (&self.local_end, &self.global_end) {
            (Some(end), _) => end(),
            (None, Some(end)) if previous == 1 => end(),
            _ => {}
        }
    }
}
