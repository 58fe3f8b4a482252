// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives owned by a single Courier worker.
//!
//! Each worker constructs its own instances; nothing here is process-global.
//!
//! - [`ChatQueueManager`]: strict per-chat ordering with a bounded backlog.
//! - [`Deduplicator`]: time-bounded "seen this message id" cache.
//! - [`RateLimiter`]: fixed-window outbound quota with warn-once semantics.
//! - [`ReconnectManager`]: exponential backoff around a reconnect action.
//! - [`TaskScope`]: the cancellable task set the other primitives spawn into.

pub mod chat_queue;
pub mod dedup;
pub mod rate_limit;
pub mod reconnect;
pub mod scope;

pub use chat_queue::{ChatQueueManager, TaskHandle};
pub use dedup::{DedupStats, Deduplicator};
pub use rate_limit::{RateDecision, RateLimiter, RateStatus};
pub use reconnect::{ReconnectManager, ReconnectStatus};
pub use scope::TaskScope;
