// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces of the external collaborators a worker and the supervisor consume.
//!
//! Implementations live outside this workspace (database engine, chat
//! transport client, business reply rules). All traits use `#[async_trait]`
//! so they can be held as `Arc<dyn Trait>`.

pub mod composer;
pub mod store;
pub mod transport;

pub use composer::ReplyComposer;
pub use store::StateStore;
pub use transport::{MessagingTransport, TransportEvent};
