// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use courier_core::{CourierError, InboundMessage, ReplyComposer, TenantId};

/// Answers every message with `"{prefix}{text}"`.
pub struct StaticComposer {
    prefix: String,
    failing: AtomicBool,
}

impl StaticComposer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes subsequent `compose` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for StaticComposer {
    fn default() -> Self {
        Self::new("echo: ")
    }
}

#[async_trait]
impl ReplyComposer for StaticComposer {
    async fn compose(
        &self,
        _tenant: &TenantId,
        message: &InboundMessage,
    ) -> Result<String, CourierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CourierError::Internal("composer unavailable".to_string()));
        }
        Ok(format!("{}{}", self.prefix, message.text))
    }
}
