// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging transport trait for the chat client driven by a worker.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{InboundMessage, MessageId, OutboundReply};

/// Events the transport pushes to the worker, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A pairing code (QR payload) the tenant must scan.
    PairingCode(String),
    /// The session is live.
    Connected,
    /// A chat message arrived.
    Message(InboundMessage),
    /// The session dropped; carries the transport's reason.
    Disconnected(String),
    /// Pairing or authentication was refused; carries the transport's detail.
    AuthFailure(String),
}

/// A single external chat session.
///
/// Events are delivered on the channel handed to the worker at construction;
/// the trait covers the commands flowing the other way.
#[async_trait]
pub trait MessagingTransport: Send + Sync + 'static {
    /// Starts (or restarts) the session. Success means the attempt was
    /// accepted; liveness is reported later via [`TransportEvent::Connected`].
    async fn initialize(&self) -> Result<(), CourierError>;

    /// Sends a reply into a chat and returns the transport's id for it.
    async fn send_reply(&self, reply: OutboundReply) -> Result<MessageId, CourierError>;

    /// Tears the session down and releases the connection.
    async fn destroy(&self) -> Result<(), CourierError>;
}
