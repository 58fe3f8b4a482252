// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging transport for deterministic testing.
//!
//! `MockTransport` implements `MessagingTransport`, pushes scripted events onto
//! the worker's event channel and captures every reply for assertion.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use courier_core::{CourierError, MessageId, MessagingTransport, OutboundReply, TransportEvent};

/// A scriptable chat session.
///
/// - **events**: pushed via [`MockTransport::emit`], read by the worker from the receiver
///   returned by [`MockTransport::new`]
/// - **sent**: replies passed to `send_reply()`, retrievable via [`MockTransport::sent_replies`]
pub struct MockTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<OutboundReply>>>,
    initialize_calls: AtomicU32,
    fail_initialize: AtomicBool,
    fail_send: AtomicBool,
    connect_on_initialize: AtomicBool,
    destroyed: AtomicBool,
    next_id: AtomicU64,
}

impl MockTransport {
    /// Create a mock transport and the event receiver the worker consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            events: tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            initialize_calls: AtomicU32::new(0),
            fail_initialize: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            connect_on_initialize: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        };
        (transport, rx)
    }

    /// Push an event as if the chat client had raised it.
    pub fn emit(&self, event: TransportEvent) {
        // The receiver is gone once the worker has shut down.
        let _ = self.events.send(event);
    }

    /// Get all replies that were sent through `send_reply()`.
    pub async fn sent_replies(&self) -> Vec<OutboundReply> {
        self.sent.lock().await.clone()
    }

    /// Texts of the sent replies, in send order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|r| r.text.clone()).collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub fn initialize_calls(&self) -> u32 {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Make `initialize()` fail until turned off again.
    pub fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    /// Make `send_reply()` fail until turned off again.
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Emit `Connected` from every successful `initialize()`.
    pub fn set_connect_on_initialize(&self, connect: bool) {
        self.connect_on_initialize.store(connect, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessagingTransport for MockTransport {
    async fn initialize(&self) -> Result<(), CourierError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(CourierError::transport("mock initialize failure"));
        }
        self.destroyed.store(false, Ordering::SeqCst);
        if self.connect_on_initialize.load(Ordering::SeqCst) {
            self.emit(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn send_reply(&self, reply: OutboundReply) -> Result<MessageId, CourierError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(CourierError::transport("mock send failure"));
        }
        let id = format!("mock-out-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().await.push(reply);
        Ok(MessageId(id))
    }

    async fn destroy(&self) -> Result<(), CourierError> {
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
