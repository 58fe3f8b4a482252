// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat sequential task runner.
//!
//! Every chat id gets a FIFO of pending tasks and a single drain task that
//! runs them one at a time. Different chats drain concurrently. A chat's
//! entry lives exactly as long as its drain: it is created on first enqueue
//! and removed by the drain once the FIFO runs dry, so a chat never has two
//! tasks running at once.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use courier_core::{ChatId, CourierError};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::scope::TaskScope;

/// A queued task, type-erased. Resolves to a failure description when the
/// underlying task failed.
type Job = BoxFuture<'static, Result<(), String>>;

type Registry = HashMap<ChatId, VecDeque<Job>>;

/// Deferred result of an enqueued task.
///
/// Resolves with the task's own result, or [`CourierError::QueueCleared`]
/// if the task was discarded by [`ChatQueueManager::clear_all`] before it ran
/// or the owning scope closed first.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, CourierError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, CourierError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(CourierError::QueueCleared)))
    }
}

/// Serializes tasks per chat id with a bounded backlog.
///
/// Must be used from within a Tokio runtime: drain tasks are spawned on it.
#[derive(Clone)]
pub struct ChatQueueManager {
    registry: Arc<Mutex<Registry>>,
    max_backlog: usize,
    scope: TaskScope,
}

impl ChatQueueManager {
    /// A manager whose drains run in a scope of their own.
    pub fn new(max_backlog: usize) -> Self {
        Self::with_scope(max_backlog, TaskScope::default())
    }

    /// Drains run inside `scope`. Once it closes, running tasks are dropped,
    /// their handles resolve to [`CourierError::QueueCleared`] and new
    /// submissions are refused.
    pub fn with_scope(max_backlog: usize, scope: TaskScope) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            max_backlog,
            scope,
        }
    }

    /// Queues `task` behind every task already submitted for `chat_id`.
    ///
    /// Fails immediately with [`CourierError::QueueFull`] when `max_backlog`
    /// tasks are already waiting; the running task does not count.
    pub fn enqueue<F, T>(&self, chat_id: &ChatId, task: F) -> Result<TaskHandle<T>, CourierError>
    where
        F: Future<Output = Result<T, CourierError>> + Send + 'static,
        T: Send + 'static,
    {
        if self.scope.is_closed() {
            return Err(CourierError::QueueCleared);
        }

        let mut registry = lock(&self.registry);

        if let Some(pending) = registry.get(chat_id)
            && pending.len() >= self.max_backlog
        {
            warn!(chat_id = %chat_id, capacity = self.max_backlog, "chat queue full, task rejected");
            return Err(CourierError::QueueFull {
                chat_id: chat_id.to_string(),
                capacity: self.max_backlog,
            });
        }

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(CourierError::Internal("chat task panicked".to_string())),
            };
            let failure = outcome.as_ref().err().map(|e| e.to_string());
            // The caller may have dropped its handle; the task still counts as run.
            let _ = tx.send(outcome);
            failure.map_or(Ok(()), Err)
        });

        match registry.get_mut(chat_id) {
            Some(pending) => pending.push_back(job),
            None => {
                registry.insert(chat_id.clone(), VecDeque::from([job]));
                let lease = Lease {
                    registry: Arc::clone(&self.registry),
                    chat_id: chat_id.clone(),
                    held: true,
                };
                self.scope.spawn(drain(lease));
                debug!(chat_id = %chat_id, "chat queue created");
            }
        }

        Ok(TaskHandle { rx })
    }

    /// Drops every pending task of every chat. Their handles resolve to
    /// [`CourierError::QueueCleared`]. A running task finishes normally and
    /// keeps its chat's slot until then, so later submissions for that chat
    /// still wait behind it.
    pub fn clear_all(&self) {
        let dropped: Vec<Job> = {
            let mut registry = lock(&self.registry);
            registry.values_mut().flat_map(|pending| pending.drain(..)).collect()
        };
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "chat queues cleared");
        }
    }

    /// Tasks waiting (not running) for `chat_id`.
    pub fn queue_size(&self, chat_id: &ChatId) -> usize {
        lock(&self.registry).get(chat_id).map_or(0, VecDeque::len)
    }

    /// Tasks waiting across all chats.
    pub fn total_queued(&self) -> usize {
        lock(&self.registry).values().map(VecDeque::len).sum()
    }

    /// Chats with a live queue (running or waiting work).
    pub fn active_chats(&self) -> usize {
        lock(&self.registry).len()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A drain's claim on its chat entry. Dropping a held lease removes the entry
/// and discards whatever is still pending in it.
struct Lease {
    registry: Arc<Mutex<Registry>>,
    chat_id: ChatId,
    held: bool,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        let orphaned = lock(&self.registry).remove(&self.chat_id);
        if let Some(pending) = orphaned {
            debug!(chat_id = %self.chat_id, dropped = pending.len(), "chat drain stopped early");
        }
    }
}

async fn drain(mut lease: Lease) {
    loop {
        let job = {
            let mut registry = lock(&lease.registry);
            let next = registry.get_mut(&lease.chat_id).and_then(VecDeque::pop_front);
            match next {
                Some(job) => job,
                None => {
                    registry.remove(&lease.chat_id);
                    lease.held = false;
                    debug!(chat_id = %lease.chat_id, "chat queue drained and released");
                    return;
                }
            }
        };

        if let Err(error) = job.await {
            warn!(chat_id = %lease.chat_id, error = %error, "chat task failed");
        }
    }
}
