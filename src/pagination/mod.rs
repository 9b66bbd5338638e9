//! Pagination and infinite-scroll bookkeeping.
//!
//! A [`Pager`] hooks into the engine at three points: before the request
//! (page info for the body), after a successful response (data, total,
//! tokens, `has_next_page`) and after a failed one (rollback).
//!
//! | Kind | Primary run | Next page | Data |
//! |------|-------------|-----------|------|
//! | classic | fetches `current` | n/a | replaced |
//! | infinite | restarts at page 1 | `current + 1` with that page's token | replaced, or appended with `infinite: true` |
//!
//! `has_next_page` is decided by, in order: the explicit predicate, the
//! next-token extractor (a token means more pages), or whether the page came
//! back full (`len == page_size`).

use crate::config::{FetchConfig, HasNextPageFn, NextTokenFn};
use crate::engine::RunMode;
use crate::store::{Store, StoreState};
use crate::types::{OperationResult, PageInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pagination fields persisted alongside a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// Page index
    pub current: u32,
    /// Page size
    pub page_size: u32,
    /// Total items
    pub total: u64,
    /// Cursor per page
    #[serde(default)]
    pub page_tokens: Vec<Option<String>>,
    /// Whether another page may exist
    #[serde(default)]
    pub has_next_page: bool,
}

impl PageSnapshot {
    /// Capture the pagination fields of a paged store
    pub fn capture(state: &StoreState) -> Option<Self> {
        Some(PageSnapshot {
            current: state.current?,
            page_size: state.page_size?,
            total: state.total,
            page_tokens: state.page_tokens.clone(),
            has_next_page: state.has_next_page,
        })
    }

    /// Write the snapshot back
    pub fn restore(&self, state: &mut StoreState) {
        state.current = Some(self.current);
        state.page_size = Some(self.page_size);
        state.total = self.total;
        state.page_tokens = self.page_tokens.clone();
        state.has_next_page = self.has_next_page;
    }
}

/// Partial page change for [`Pager::set_page`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageChange {
    /// New page index
    pub current: Option<u32>,
    /// New page size
    pub page_size: Option<u32>,
}

impl PageChange {
    /// Change only the page index
    pub fn page(current: u32) -> Self {
        PageChange { current: Some(current), page_size: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagerKind {
    Classic,
    Infinite,
}

/// Page state machine for one paged store.
#[derive(Clone)]
pub struct Pager {
    kind: PagerKind,
    append: bool,
    page_size: u32,
    get_next_token: Option<NextTokenFn>,
    has_next_page: Option<HasNextPageFn>,
}

impl Pager {
    /// Classic page-number pagination
    pub fn classic(config: &FetchConfig) -> Self {
        Pager {
            kind: PagerKind::Classic,
            append: false,
            page_size: config.page_size_or_default(),
            get_next_token: config.get_next_token.clone(),
            has_next_page: config.has_next_page.clone(),
        }
    }

    /// Cursor pagination with next-page fetching
    pub fn infinite(config: &FetchConfig) -> Self {
        Pager {
            kind: PagerKind::Infinite,
            append: config.infinite.unwrap_or(false),
            ..Pager::classic(config)
        }
    }

    /// Whether next pages are appended to `data`
    pub fn appends(&self) -> bool {
        self.append
    }

    /// Seed the pagination fields of a fresh store
    pub fn init(&self, state: &mut StoreState) {
        state.current = Some(1);
        state.page_size = Some(self.page_size);
        state.total = 0;
        state.page_tokens = vec![None];
        state.has_next_page = true;
        state.is_loading_next_page = false;
        state.is_error_next_page = false;
    }

    /// Clear back to page one
    pub fn reset(&self, state: &mut StoreState) {
        let page_size = state.page_size.unwrap_or(self.page_size);
        self.init(state);
        state.page_size = Some(page_size);
    }

    /// Apply a page change without fetching
    pub fn set_page(&self, store: &Store, change: PageChange) {
        store.update(|s| {
            if let Some(current) = change.current.filter(|c| *c > 0) {
                s.current = Some(current);
            }
            if let Some(page_size) = change.page_size.filter(|p| *p > 0) {
                s.page_size = Some(page_size);
            }
        });
    }

    /// Move to the page about to be fetched and describe it
    pub fn begin(&self, store: &Store, mode: RunMode) -> PageInfo {
        let mut info = None;
        store.update(|s| {
            let current = match (self.kind, mode) {
                (PagerKind::Infinite, RunMode::NextPage) => s.current.unwrap_or(1) + 1,
                (PagerKind::Infinite, RunMode::Primary) => 1,
                (PagerKind::Classic, _) => s.current.unwrap_or(1),
            };
            s.current = Some(current);
            if mode == RunMode::NextPage {
                s.is_loading_next_page = true;
                s.is_error_next_page = false;
            }
            let next_token = s
                .page_tokens
                .get(current as usize - 1)
                .cloned()
                .flatten();
            info = Some(PageInfo {
                current,
                page_size: s.page_size.unwrap_or(self.page_size),
                next_token,
            });
        });
        info.unwrap_or(PageInfo { current: 1, page_size: self.page_size, next_token: None })
    }

    /// Data to store for a fetched page
    pub fn page_data(&self, state: &StoreState, page: Value, mode: RunMode) -> Value {
        if !(self.append && mode == RunMode::NextPage) {
            return page;
        }
        let mut items = match &state.data {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        match page {
            Value::Array(more) => items.extend(more),
            Value::Null => {}
            other => items.push(other),
        }
        Value::Array(items)
    }

    /// Record a successful page: total, tokens and `has_next_page`.
    ///
    /// `page` is the page as the server returned it, before `post_data`.
    pub fn apply_success(&self, state: &mut StoreState, result: &OperationResult, page: Option<&Value>) {
        let current = state.current.unwrap_or(1);
        let page_size = state.page_size.unwrap_or(self.page_size);
        let next_token = self.get_next_token.as_ref().and_then(|f| f(result));

        state.has_next_page = match (&self.has_next_page, &self.get_next_token) {
            (Some(predicate), _) => predicate(result),
            (None, Some(_)) => next_token.is_some(),
            (None, None) => page
                .and_then(Value::as_array)
                .is_some_and(|items| items.len() == page_size as usize),
        };

        let mut tokens = state.page_tokens.clone();
        tokens.resize(current as usize, None);
        if next_token.is_some() {
            tokens.push(next_token);
        }
        state.page_tokens = tokens;
        state.total = result.total.unwrap_or(0);
        state.is_loading_next_page = false;
        state.is_error_next_page = false;
    }

    /// Undo the page advance of a failed or cancelled next-page fetch
    pub fn apply_failure(&self, state: &mut StoreState, mode: RunMode, cancelled: bool) {
        if mode != RunMode::NextPage {
            return;
        }
        if self.kind == PagerKind::Infinite {
            state.current = Some(state.current.unwrap_or(1).saturating_sub(1).max(1));
        }
        state.is_loading_next_page = false;
        state.is_error_next_page = !cancelled;
    }

    /// Cache key suffix identifying the page
    pub fn cache_suffix(&self, state: &StoreState) -> String {
        format!(
            "{}_{}",
            state.current.unwrap_or(1),
            state.page_size.unwrap_or(self.page_size)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn paged_store(pager: &Pager) -> Store {
        let mut state = StoreState::default();
        pager.init(&mut state);
        Store::new(state)
    }

    fn config(page_size: u32) -> FetchConfig {
        FetchConfig { page_size: Some(page_size), ..Default::default() }
    }

    #[test]
    fn test_classic_keeps_current() {
        let pager = Pager::classic(&config(20));
        let store = paged_store(&pager);
        pager.set_page(&store, PageChange::page(3));
        let info = pager.begin(&store, RunMode::Primary);
        assert_eq!(info, PageInfo { current: 3, page_size: 20, next_token: None });
        assert_eq!(pager.cache_suffix(&store.get()), "3_20");
    }

    #[test]
    fn test_has_next_by_page_length() {
        let pager = Pager::infinite(&config(2));
        let store = paged_store(&pager);
        pager.begin(&store, RunMode::Primary);

        let full = json!([1, 2]);
        store.update(|s| pager.apply_success(s, &OperationResult::ok(full.clone()), Some(&full)));
        assert!(store.get().has_next_page);

        pager.begin(&store, RunMode::NextPage);
        let short = json!([3]);
        store.update(|s| pager.apply_success(s, &OperationResult::ok(short.clone()), Some(&short)));
        let state = store.get();
        assert!(!state.has_next_page);
        assert_eq!(state.current, Some(2));
    }

    #[test]
    fn test_tokens_recorded_per_page() {
        let extract: NextTokenFn = Arc::new(|res: &OperationResult| {
            res.extra.as_ref()?.get("next")?.as_str().map(str::to_string)
        });
        let pager = Pager::infinite(&FetchConfig { get_next_token: Some(extract), ..config(10) });
        let store = paged_store(&pager);

        pager.begin(&store, RunMode::Primary);
        let res = OperationResult::ok(json!([])).with_extra(json!({"next": "t2"}));
        store.update(|s| pager.apply_success(s, &res, res.data.as_ref()));
        assert_eq!(store.get().page_tokens, vec![None, Some("t2".into())]);
        assert!(store.get().has_next_page);

        let info = pager.begin(&store, RunMode::NextPage);
        assert_eq!(info.next_token.as_deref(), Some("t2"));
        let last = OperationResult::ok(json!([]));
        store.update(|s| pager.apply_success(s, &last, last.data.as_ref()));
        assert!(!store.get().has_next_page);
        assert_eq!(store.get().page_tokens.len(), 2);
    }

    #[test]
    fn test_append_only_on_next_page() {
        let pager = Pager::infinite(&FetchConfig { infinite: Some(true), ..config(2) });
        let mut state = StoreState { data: Some(json!([1, 2])), ..Default::default() };
        assert_eq!(pager.page_data(&state, json!([3]), RunMode::NextPage), json!([1, 2, 3]));
        assert_eq!(pager.page_data(&state, json!([9]), RunMode::Primary), json!([9]));
        state.data = None;
        assert_eq!(pager.page_data(&state, json!([3]), RunMode::NextPage), json!([3]));
    }

    #[test]
    fn test_failed_next_page_rolls_back() {
        let pager = Pager::infinite(&config(10));
        let store = paged_store(&pager);
        pager.begin(&store, RunMode::NextPage);
        assert!(store.get().is_loading_next_page);
        store.update(|s| pager.apply_failure(s, RunMode::NextPage, false));
        let state = store.get();
        assert_eq!(state.current, Some(1));
        assert!(state.is_error_next_page);
        assert!(!state.is_loading_next_page);
    }

    #[test]
    fn test_snapshot_restore() {
        let pager = Pager::classic(&config(5));
        let mut state = StoreState::default();
        pager.init(&mut state);
        state.current = Some(4);
        state.total = 37;
        let snapshot = PageSnapshot::capture(&state).unwrap();

        let mut fresh = StoreState::default();
        snapshot.restore(&mut fresh);
        assert_eq!(fresh.current, Some(4));
        assert_eq!(fresh.total, 37);
        assert!(PageSnapshot::capture(&StoreState::default()).is_none());
    }
}
