// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by workers, the supervisor, and collaborator traits.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::lifecycle::LifecycleState;

/// Identifier of a tenant. One worker serves exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identifier of a remote conversation partner; the ordering key for chat queues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

/// Transport-assigned message identifier, used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $ty {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

display_inner!(TenantId, ChatId, MessageId);

/// Externally visible status of a tenant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    New,
    QrPending,
    Active,
    Error,
    Stopped,
}

/// The supervisor's view of a tenant's worker process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Stopped,
    Running,
    Error,
}

/// State of the external chat session driven by a worker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Disconnected,
    QrReady,
    Connecting,
    Connected,
}

/// An inbound chat message delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Transport-assigned id; the deduplication key.
    pub id: MessageId,
    /// Sender, and the chat the reply goes back to.
    pub chat_id: ChatId,
    /// Recipient address as reported by the transport, if any.
    pub to: Option<String>,
    pub text: String,
    /// Set when the message was sent by the worker's own account.
    pub from_me: bool,
}

/// A reply sent back to a chat through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub chat_id: ChatId,
    pub text: String,
    pub in_reply_to: MessageId,
}

/// Direction of a message log entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    In,
    Out,
}

/// Append-only message log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub tenant_id: TenantId,
    pub direction: Direction,
    pub from: String,
    pub to: String,
    pub text: String,
    pub external_id: Option<MessageId>,
}

/// Partial update of a worker process row. `None` leaves a field untouched.
///
/// `last_error: Some(None)` clears the stored error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerUpdate {
    pub status: Option<WorkerStatus>,
    pub last_error: Option<Option<String>>,
}

impl WorkerUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.last_error.is_none()
    }
}

/// Partial update of a messaging session row. `None` leaves a field untouched.
///
/// `last_qr: Some(None)` clears the stored pairing artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub state: Option<SessionState>,
    pub last_qr: Option<Option<String>>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.last_qr.is_none() && self.last_seen_at.is_none()
    }
}

/// Point-in-time view of everything the supervisor tracks for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub tenant_id: TenantId,
    pub tenant_status: TenantStatus,
    pub worker_status: WorkerStatus,
    pub last_error: Option<String>,
    pub session_state: SessionState,
    pub last_qr: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl TenantSnapshot {
    /// Fresh snapshot for a tenant nobody has started yet.
    pub fn new(tenant_id: TenantId) -> Self {
        let initial = LifecycleState::initial();
        Self {
            tenant_id,
            tenant_status: initial.tenant(),
            worker_status: initial.worker(),
            last_error: None,
            session_state: initial.session(),
            last_qr: None,
            last_seen_at: None,
        }
    }

    /// The lifecycle triple recorded in this snapshot.
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_parts(self.tenant_status, self.worker_status, self.session_state)
    }
}
