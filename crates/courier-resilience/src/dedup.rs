// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-windowed message id cache.
//!
//! An id stays a duplicate for `ttl` after it was last marked. The live set is
//! capped; at capacity the entry with the oldest mark time makes room for a new
//! id regardless of its age.

use std::collections::HashMap;
use std::time::Duration;

use courier_config::model::DedupConfig;
use tokio::time::Instant;
use tracing::debug;

/// Observability view of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl: Duration,
}

/// Per-worker message deduplication cache.
#[derive(Debug)]
pub struct Deduplicator {
    seen: HashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_limits(config.ttl(), config.capacity)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            seen: HashMap::with_capacity(capacity.min(1024)),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Returns `true` if `id` was marked within the TTL. Expired entries are
    /// swept first.
    pub fn is_duplicate(&mut self, id: &str) -> bool {
        self.sweep_expired();
        self.seen.contains_key(id)
    }

    /// Records `id` as seen now. Re-marking an id refreshes its mark time.
    pub fn mark_seen(&mut self, id: &str) {
        let now = Instant::now();
        if let Some(seen_at) = self.seen.get_mut(id) {
            *seen_at = now;
            return;
        }

        if self.seen.len() >= self.capacity {
            self.evict_oldest();
        }
        self.seen.insert(id.to_string(), now);
    }

    /// Removes every entry older than the TTL. Returns how many were removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.seen.len();
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= ttl);
        let removed = before - self.seen.len();
        if removed > 0 {
            debug!(removed, remaining = self.seen.len(), "swept expired dedup entries");
        }
        removed
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            size: self.seen.len(),
            capacity: self.capacity,
            ttl: self.ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .seen
            .iter()
            .min_by_key(|(_, seen_at)| **seen_at)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.seen.remove(&id);
            debug!(message_id = %id, "dedup cache full, evicted oldest entry");
        }
    }
}
