// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business-rule reply generation.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{InboundMessage, TenantId};

/// Produces the reply text for an inbound message.
#[async_trait]
pub trait ReplyComposer: Send + Sync + 'static {
    async fn compose(
        &self,
        tenant: &TenantId,
        message: &InboundMessage,
    ) -> Result<String, CourierError>;
}
