// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for Courier integration tests.
//!
//! Provides in-memory collaborators for fast, deterministic tests without a
//! database or a live chat session.
//!
//! # Components
//!
//! - [`MemoryStore`] - In-memory `StateStore` with injectable write failures
//! - [`MockTransport`] - Scriptable `MessagingTransport` that captures replies
//! - [`StaticComposer`] - `ReplyComposer` answering with a fixed prefix

pub mod composer;
pub mod memory_store;
pub mod mock_transport;

pub use composer::StaticComposer;
pub use memory_store::{MemoryStore, SetupStatus};
pub use mock_transport::MockTransport;

use courier_core::{ChatId, InboundMessage, MessageId};

/// Builds an inbound text message from `chat` with transport id `id`.
pub fn inbound(id: &str, chat: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: MessageId::from(id),
        chat_id: ChatId::from(chat),
        to: Some("me@c.us".to_string()),
        text: text.to_string(),
        from_me: false,
    }
}
