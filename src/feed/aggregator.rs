// src/feed/aggregator.rs
//! Merged state: composite key → item, last write wins by arrival order.
//!
//! The aggregator itself is plain data; the session runs it inside a single
//! actor task so every mutation is serialized.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::feed::types::{ActivityItem, CompositeKey, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// Inserted, and the kind's oldest entry fell out of its window.
    InsertedWithEviction,
}

#[derive(Debug)]
pub struct AggregatorCore {
    entries: HashMap<CompositeKey, ActivityItem>,
    per_kind: HashMap<SourceKind, usize>,
    per_source_cap: usize,
}

impl AggregatorCore {
    pub fn new(per_source_cap: usize) -> Self {
        let cap = per_source_cap.max(1);
        Self {
            entries: HashMap::with_capacity(cap * SourceKind::ALL.len()),
            per_kind: HashMap::new(),
            per_source_cap: cap,
        }
    }

    pub fn upsert(&mut self, item: ActivityItem) -> UpsertOutcome {
        let kind = item.source_kind;
        if self.entries.insert(item.key(), item).is_some() {
            return UpsertOutcome::Replaced;
        }

        let count = self.per_kind.entry(kind).or_insert(0);
        *count += 1;
        if *count <= self.per_source_cap {
            return UpsertOutcome::Inserted;
        }

        if let Some(oldest) = self.oldest_of(kind) {
            self.entries.remove(&oldest);
            if let Some(c) = self.per_kind.get_mut(&kind) {
                *c -= 1;
            }
        }
        UpsertOutcome::InsertedWithEviction
    }

    /// All current values in feed order.
    pub fn snapshot(&self) -> Vec<ActivityItem> {
        let mut keyed: Vec<(String, &ActivityItem)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        keyed.sort_by(|(ka, a), (kb, b)| feed_order(a, ka, b, kb));
        keyed.into_iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&ActivityItem> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len_of(&self, kind: SourceKind) -> usize {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Upper bound on `len()`.
    pub fn capacity(&self) -> usize {
        self.per_source_cap * SourceKind::ALL.len()
    }

    // The entry a newest-first window of this kind would drop next.
    fn oldest_of(&self, kind: SourceKind) -> Option<CompositeKey> {
        self.entries
            .iter()
            .filter(|(k, _)| k.kind == kind)
            .map(|(k, v)| (k.to_string(), k, v))
            .max_by(|(ka, _, a), (kb, _, b)| feed_order(a, ka, b, kb))
            .map(|(_, k, _)| k.clone())
    }
}

/// Newest first; equal timestamps fall back to ascending composite key text.
pub fn feed_order(a: &ActivityItem, a_key: &str, b: &ActivityItem, b_key: &str) -> Ordering {
    b.occurred_at
        .cmp(&a.occurred_at)
        .then_with(|| a_key.cmp(b_key))
}

/// Sorts a vector of items into feed order in place.
pub fn sort_feed(items: &mut [ActivityItem]) {
    items.sort_by_cached_key(|it| (std::cmp::Reverse(it.occurred_at), it.key().to_string()));
}
