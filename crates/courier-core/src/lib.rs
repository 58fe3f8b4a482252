// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Courier tenant workers.
//!
//! This crate provides the error type, identifiers, the tenant / worker /
//! session state machine, and the traits of the external collaborators (the
//! persistent store, the chat transport, and the reply composer) used
//! throughout the workspace.

pub mod error;
pub mod lifecycle;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use lifecycle::{LifecycleEvent, LifecycleState, TransitionWrite};
pub use traits::{MessagingTransport, ReplyComposer, StateStore, TransportEvent};
pub use types::{
    ChatId, Direction, InboundMessage, MessageId, MessageLogEntry, OutboundReply, SessionState,
    SessionUpdate, TenantId, TenantSnapshot, TenantStatus, WorkerStatus, WorkerUpdate,
};
