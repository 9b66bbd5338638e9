//! Debounce and throttle gating.
//!
//! At most one strategy applies per store:
//!
//! - **Debounce**: every call takes a ticket and waits out the window. Only
//!   the holder of the newest ticket runs; the others settle with a
//!   cancellation-shaped result instead of hanging.
//! - **Throttle**: the first call of a window runs at once. Calls arriving
//!   inside the window are coalesced into one trailing run at the window's
//!   end, performed by the newest of them; every coalesced caller settles with
//!   that run's result.
//!
//! Every wait races the store's cancellation token, so `cancel()` releases
//! pending callers immediately.

use crate::error::Result;
use crate::types::OperationResult;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Message carried by calls released by `cancel()` while gated
pub const CANCEL_MESSAGE: &str = "user cancel";
/// Message carried by debounced calls that lost to a newer call
pub const SUPERSEDED_MESSAGE: &str = "superseded by a newer call";

type Shared = Option<Result<OperationResult>>;

struct Trailing {
    latest: u64,
    deadline: Instant,
    tx: watch::Sender<Shared>,
}

/// Timing state of a throttle gate
#[derive(Default)]
pub struct ThrottleState {
    last_run: Option<Instant>,
    next_ticket: u64,
    trailing: Option<Trailing>,
}

enum Plan {
    Now,
    Wait {
        ticket: u64,
        deadline: Instant,
        rx: watch::Receiver<Shared>,
    },
}

/// Rate-shaping strategy of one store.
pub enum Gate {
    /// Every call runs
    Open,
    /// Only the last call of a burst runs
    Debounce {
        /// Quiet period
        window: Duration,
        /// Newest ticket handed out
        generation: AtomicU64,
    },
    /// At most one leading and one trailing run per window
    Throttle {
        /// Window length
        window: Duration,
        /// Timing state
        state: Mutex<ThrottleState>,
    },
}

impl Gate {
    /// Pick the strategy; debounce wins when both are set
    pub fn new(debounce: Option<Duration>, throttle: Option<Duration>) -> Self {
        match (debounce, throttle) {
            (Some(window), _) if !window.is_zero() => Gate::Debounce {
                window,
                generation: AtomicU64::new(0),
            },
            (_, Some(window)) if !window.is_zero() => Gate::Throttle {
                window,
                state: Mutex::new(ThrottleState::default()),
            },
            _ => Gate::Open,
        }
    }

    /// Run `f` subject to the gate
    pub async fn pass<F, Fut>(&self, token: &CancellationToken, f: F) -> Result<OperationResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<OperationResult>>,
    {
        match self {
            Gate::Open => f().await,
            Gate::Debounce { window, generation } => {
                let ticket = generation.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::select! {
                    _ = token.cancelled() => return Ok(OperationResult::cancelled(CANCEL_MESSAGE)),
                    _ = tokio::time::sleep(*window) => {}
                }
                if generation.load(Ordering::SeqCst) != ticket {
                    tracing::debug!("debounced call {} superseded", ticket);
                    return Ok(OperationResult::cancelled(SUPERSEDED_MESSAGE));
                }
                f().await
            }
            Gate::Throttle { window, state } => throttle(*window, state, token, f).await,
        }
    }
}

async fn throttle<F, Fut>(
    window: Duration,
    state: &Mutex<ThrottleState>,
    token: &CancellationToken,
    f: F,
) -> Result<OperationResult>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<OperationResult>>,
{
    let plan = {
        let mut st = state.lock();
        let now = Instant::now();
        let open = st.trailing.is_none() && st.last_run.map_or(true, |last| now >= last + window);
        if open {
            st.last_run = Some(now);
            Plan::Now
        } else {
            st.next_ticket += 1;
            let ticket = st.next_ticket;
            let earliest = st.last_run.map_or(now, |last| last + window);
            let trailing = st.trailing.get_or_insert_with(|| Trailing {
                latest: ticket,
                deadline: earliest.max(now),
                tx: watch::channel(None).0,
            });
            trailing.latest = ticket;
            tracing::debug!("throttled call {} coalesced into trailing run", ticket);
            Plan::Wait {
                ticket,
                deadline: trailing.deadline,
                rx: trailing.tx.subscribe(),
            }
        }
    };

    let (ticket, deadline, mut rx) = match plan {
        Plan::Now => return f().await,
        Plan::Wait { ticket, deadline, rx } => (ticket, deadline, rx),
    };

    tokio::select! {
        _ = token.cancelled() => {
            let mut st = state.lock();
            if st.trailing.as_ref().is_some_and(|t| t.latest == ticket) {
                st.trailing = None;
            }
            return Ok(OperationResult::cancelled(CANCEL_MESSAGE));
        }
        _ = tokio::time::sleep_until(deadline) => {}
    }

    let leader = {
        let mut st = state.lock();
        if st.trailing.as_ref().is_some_and(|t| t.latest == ticket) {
            st.last_run = Some(Instant::now());
            st.trailing.take().map(|t| t.tx)
        } else {
            None
        }
    };

    if let Some(tx) = leader {
        let result = f().await;
        tx.send_replace(Some(result.clone()));
        return result;
    }

    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return result;
        }
        tokio::select! {
            _ = token.cancelled() => return Ok(OperationResult::cancelled(CANCEL_MESSAGE)),
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(OperationResult::cancelled(CANCEL_MESSAGE));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    async fn gated(gate: &Gate, token: &CancellationToken, runs: &AtomicUsize, n: u64) -> Result<OperationResult> {
        gate.pass(token, || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(OperationResult::ok(json!(n)))
        })
        .await
    }

    #[test]
    fn test_selection() {
        assert!(matches!(Gate::new(None, None), Gate::Open));
        assert!(matches!(Gate::new(Some(Duration::from_millis(5)), None), Gate::Debounce { .. }));
        assert!(matches!(Gate::new(None, Some(Duration::from_millis(5))), Gate::Throttle { .. }));
        assert!(matches!(Gate::new(Some(Duration::ZERO), None), Gate::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_runs_last_call_only() {
        let gate = Arc::new(Gate::new(Some(Duration::from_millis(100)), None));
        let token = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for n in 0..5u64 {
            let (gate, token, runs) = (Arc::clone(&gate), token.clone(), Arc::clone(&runs));
            handles.push(tokio::spawn(async move { gated(&gate, &token, &runs, n).await }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(results[..4].iter().all(|r| r.is_cancel));
        assert_eq!(results[4].data, Some(json!(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_coalesces_into_trailing_run() {
        let gate = Arc::new(Gate::new(None, Some(Duration::from_millis(100))));
        let token = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for n in 0..4u64 {
            let (gate, token, runs) = (Arc::clone(&gate), token.clone(), Arc::clone(&runs));
            handles.push(tokio::spawn(async move { gated(&gate, &token, &runs, n).await }));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        // one leading run, one trailing run shared by the rest
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(results[0].data, Some(json!(0)));
        assert!(results[1..].iter().all(|r| r.data == Some(json!(3))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_waiters() {
        let gate = Arc::new(Gate::new(Some(Duration::from_secs(10)), None));
        let token = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let pending = {
            let (gate, token, runs) = (Arc::clone(&gate), token.clone(), Arc::clone(&runs));
            tokio::spawn(async move { gated(&gate, &token, &runs, 1).await })
        };
        tokio::task::yield_now().await;
        token.cancel();
        let res = pending.await.unwrap().unwrap();
        assert!(res.is_cancel);
        assert_eq!(res.message.as_deref(), Some(CANCEL_MESSAGE));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_trailing_run() {
        let gate = Arc::new(Gate::new(None, Some(Duration::from_millis(100))));
        let token = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let leading = gated(&gate, &token, &runs, 0).await.unwrap();
        assert_eq!(leading.data, Some(json!(0)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let pending = {
            let (gate, token, runs) = (Arc::clone(&gate), token.clone(), Arc::clone(&runs));
            tokio::spawn(async move { gated(&gate, &token, &runs, 1).await })
        };
        tokio::task::yield_now().await;
        token.cancel();

        let res = pending.await.unwrap().unwrap();
        assert!(res.is_cancel);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // a later caller with a fresh token still gets its trailing run
        let fresh = CancellationToken::new();
        let next = gated(&gate, &fresh, &runs, 2).await.unwrap();
        assert_eq!(next.data, Some(json!(2)));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
