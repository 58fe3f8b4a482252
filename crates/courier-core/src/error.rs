// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Courier workers and the supervisor.

use thiserror::Error;

use crate::lifecycle::{LifecycleEvent, LifecycleState};

/// The primary error type used across the collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistent store errors (connection, query failure, missing row).
    #[error("store error: {message}")]
    Store {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Messaging transport errors (send failure, initialize failure, auth).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The per-chat backlog is at capacity; the task was not queued.
    #[error("chat queue full for {chat_id} (capacity {capacity})")]
    QueueFull { chat_id: String, capacity: usize },

    /// A pending task was rejected because the queues were cleared.
    #[error("queue cleared during shutdown")]
    QueueCleared,

    /// A lifecycle event was applied to a state that has no such edge.
    #[error("invalid lifecycle transition: {event} from {from}")]
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Builds a [`CourierError::Store`] from a plain message.
    pub fn store(message: impl Into<String>) -> Self {
        CourierError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`CourierError::Transport`] from a plain message.
    pub fn transport(message: impl Into<String>) -> Self {
        CourierError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Returns `true` for the queue-full rejection.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, CourierError::QueueFull { .. })
    }
}
