// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-tenant worker coordinator.
//!
//! [`WorkerLifecycleCoordinator`] owns one transport session and the worker's
//! resilience components. It turns transport events into lifecycle
//! transitions, gates inbound messages through deduplication and the chat
//! queues, rate limits replies, and drives the heartbeat and reconnect timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use courier_config::model::{CourierConfig, NoticeConfig};
use courier_core::{
    CourierError, Direction, InboundMessage, LifecycleEvent, LifecycleState, MessageId,
    MessageLogEntry, MessagingTransport, OutboundReply, ReplyComposer, SessionUpdate, StateStore,
    TenantId, TransitionWrite, TransportEvent, WorkerStatus, WorkerUpdate,
};
use courier_resilience::reconnect::{ExhaustedCallback, ReconnectAction};
use courier_resilience::{
    ChatQueueManager, DedupStats, Deduplicator, RateLimiter, RateStatus, ReconnectManager,
    ReconnectStatus, TaskHandle,
};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::heartbeat::Heartbeat;
use crate::scheduler::WorkerScheduler;

/// Longest `last_error` text written to the store.
const MAX_ERROR_LEN: usize = 1000;

const RECONNECT_EXHAUSTED_REASON: &str = "max reconnect attempts reached";

/// External collaborators of a worker.
pub struct WorkerDeps {
    pub store: Arc<dyn StateStore>,
    pub transport: Arc<dyn MessagingTransport>,
    pub composer: Arc<dyn ReplyComposer>,
}

/// What happened to an inbound message at the gate.
pub enum InboundOutcome {
    /// Sent by our own account, or the session is not ready.
    Ignored,
    /// Already seen within the dedup window.
    Duplicate,
    /// The chat's backlog was full; the "please wait" notice was attempted.
    QueueFull,
    /// Accepted; resolves once the message has been handled.
    Queued(TaskHandle<MessageOutcome>),
}

/// Result of handling one accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Replied(MessageId),
    /// Over the reply quota. `notice_sent` is set on the first denial of a window.
    RateLimited { notice_sent: bool },
    /// Handling failed; the reason was recorded as the worker's last error.
    Failed(String),
}

/// Point-in-time view of a worker for the admin surface and logs.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub tenant_id: TenantId,
    pub ready: bool,
    pub lifecycle: LifecycleState,
    pub heartbeat_running: bool,
    pub queued_tasks: usize,
    pub active_chats: usize,
    pub dedup: DedupStats,
    pub rate_limit: RateStatus,
    pub reconnect: ReconnectStatus,
}

pub struct WorkerLifecycleCoordinator {
    tenant_id: TenantId,
    store: Arc<dyn StateStore>,
    transport: Arc<dyn MessagingTransport>,
    composer: Arc<dyn ReplyComposer>,
    dedup: Mutex<Deduplicator>,
    limiter: Mutex<RateLimiter>,
    queues: ChatQueueManager,
    reconnect: ReconnectManager,
    heartbeat: Heartbeat,
    scheduler: WorkerScheduler,
    /// Last lifecycle state the store accepted.
    committed: tokio::sync::Mutex<LifecycleState>,
    /// Transport readiness; gates inbound messages independently of the store.
    ready: AtomicBool,
    notices: NoticeConfig,
    dedup_sweep_interval: Duration,
    me: Weak<Self>,
}

impl WorkerLifecycleCoordinator {
    /// Builds a worker for `tenant_id`. Its timers stop when `parent` is cancelled.
    pub fn new(
        tenant_id: TenantId,
        config: &CourierConfig,
        deps: WorkerDeps,
        parent: &CancellationToken,
    ) -> Arc<Self> {
        let scheduler = WorkerScheduler::new(parent);

        Arc::new_cyclic(|me: &Weak<Self>| {
            let action_ref = me.clone();
            let action: ReconnectAction = Arc::new(move || {
                let me = action_ref.clone();
                async move {
                    match me.upgrade() {
                        Some(worker) => worker.reconnect_attempt().await,
                        None => Err(CourierError::Internal("worker dropped".to_string())),
                    }
                }
                .boxed()
            });

            let exhausted_ref = me.clone();
            let on_exhausted: ExhaustedCallback = Arc::new(move || {
                let me = exhausted_ref.clone();
                async move {
                    if let Some(worker) = me.upgrade() {
                        worker.on_reconnect_exhausted().await;
                    }
                }
                .boxed()
            });

            let reconnect = ReconnectManager::new(
                &config.reconnect,
                action,
                on_exhausted,
                scheduler.scope().clone(),
            );

            Self {
                tenant_id,
                store: deps.store,
                transport: deps.transport,
                composer: deps.composer,
                dedup: Mutex::new(Deduplicator::new(&config.dedup)),
                limiter: Mutex::new(RateLimiter::new(&config.rate_limit)),
                queues: ChatQueueManager::with_scope(
                    config.queue.max_backlog,
                    scheduler.scope().clone(),
                ),
                reconnect,
                heartbeat: Heartbeat::new(&config.heartbeat),
                scheduler,
                committed: tokio::sync::Mutex::new(LifecycleState::initial()),
                ready: AtomicBool::new(false),
                notices: config.notices.clone(),
                dedup_sweep_interval: config.dedup.sweep_interval(),
                me: me.clone(),
            }
        })
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Starts the periodic dedup sweep and asks the transport to connect.
    ///
    /// A transport that refuses to initialize is an unrecoverable fault: the
    /// worker is marked ERROR, reconnection is halted and the error is returned.
    pub async fn start(&self) -> Result<(), CourierError> {
        info!(tenant_id = %self.tenant_id, "starting worker");

        match self.store.snapshot(&self.tenant_id).await {
            Ok(Some(snapshot)) => *self.committed.lock().await = snapshot.lifecycle(),
            Ok(None) => {}
            Err(e) => warn!(tenant_id = %self.tenant_id, error = %e, "could not read stored state"),
        }

        self.spawn_dedup_sweep();

        if let Err(e) = self.commit(LifecycleEvent::ConnectAttempt, |w| w).await {
            warn!(tenant_id = %self.tenant_id, error = %e, "failed to record connect attempt");
        }

        if let Err(e) = self.transport.initialize().await {
            error!(tenant_id = %self.tenant_id, error = %e, "transport failed to start");
            self.reconnect.halt();
            let reason = truncate(&e.to_string());
            if let Err(write) = self
                .commit(LifecycleEvent::Fault, |w| w.with_last_error(Some(reason)))
                .await
            {
                error!(tenant_id = %self.tenant_id, error = %write, "failed to record start failure");
            }
            return Err(e);
        }

        Ok(())
    }

    /// Dispatches transport events one at a time until the stream ends or the
    /// worker shuts down.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let token = self.scheduler.token();
        info!(tenant_id = %self.tenant_id, "worker event loop running");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(tenant_id = %self.tenant_id, "shutdown signal received, stopping event loop");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!(tenant_id = %self.tenant_id, "transport event stream closed");
                        break;
                    }
                },
            }
        }
    }

    /// Runs the event loop until `stop` fires or the stream ends, then shuts
    /// the worker down. Pass [`install_signal_handler`](crate::install_signal_handler)
    /// to stop on SIGINT/SIGTERM.
    pub async fn run_until(
        &self,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        stop: CancellationToken,
    ) {
        tokio::select! {
            _ = self.run(events) => {}
            _ = stop.cancelled() => info!(tenant_id = %self.tenant_id, "stop requested"),
        }
        self.shutdown().await;
    }

    /// Applies one transport event.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::PairingCode(code) => self.on_pairing_code(code).await,
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Message(message) => {
                let _ = self.handle_inbound(message);
            }
            TransportEvent::Disconnected(reason) => self.on_disconnected(&reason).await,
            TransportEvent::AuthFailure(detail) => self.on_auth_failure(&detail).await,
        }
    }

    /// Gates an inbound message and queues it behind earlier messages of its chat.
    pub fn handle_inbound(&self, message: InboundMessage) -> InboundOutcome {
        if !self.is_ready() || message.from_me {
            debug!(message_id = %message.id, "inbound message ignored");
            return InboundOutcome::Ignored;
        }

        {
            let mut dedup = lock(&self.dedup);
            if dedup.is_duplicate(&message.id.0) {
                warn!(message_id = %message.id, "duplicate message detected, skipping");
                return InboundOutcome::Duplicate;
            }
            dedup.mark_seen(&message.id.0);
        }

        let Some(me) = self.me.upgrade() else {
            return InboundOutcome::Ignored;
        };
        let chat_id = message.chat_id.clone();
        let queued = message.clone();

        match self
            .queues
            .enqueue(&chat_id, async move { Ok(me.process_message(queued).await) })
        {
            Ok(handle) => InboundOutcome::Queued(handle),
            Err(e) if e.is_queue_full() => {
                warn!(chat_id = %chat_id, error = %e, "queue full, sending wait notice");
                if let Some(me) = self.me.upgrade() {
                    let notice = self.notices.queue_full.clone();
                    self.scheduler
                        .spawn(async move { me.send_notice(&message, notice).await });
                }
                InboundOutcome::QueueFull
            }
            Err(e) => {
                debug!(chat_id = %chat_id, error = %e, "worker stopping, message dropped");
                InboundOutcome::Ignored
            }
        }
    }

    /// Writes a liveness beat: session last seen now, worker re-affirmed RUNNING.
    pub async fn heartbeat_tick(&self) {
        let now = Utc::now();
        match self
            .commit(LifecycleEvent::HeartbeatTick, |w| {
                w.with_last_seen(now).with_worker_status(WorkerStatus::Running)
            })
            .await
        {
            Ok(_) => debug!(tenant_id = %self.tenant_id, "heartbeat sent"),
            Err(e) => warn!(tenant_id = %self.tenant_id, error = %e, "heartbeat failed"),
        }
    }

    /// Stops heartbeat and reconnect, rejects queued messages, releases the
    /// transport, then cancels every remaining worker task.
    pub async fn shutdown(&self) {
        info!(tenant_id = %self.tenant_id, "stopping worker");
        self.heartbeat.stop();
        self.reconnect.stop();
        self.queues.clear_all();
        self.ready.store(false, Ordering::SeqCst);

        if let Err(e) = self.transport.destroy().await {
            error!(tenant_id = %self.tenant_id, error = %e, "error releasing transport");
        }
        self.scheduler.shutdown().await;
        info!(tenant_id = %self.tenant_id, "worker stopped");
    }

    pub async fn status(&self) -> WorkerReport {
        let (dedup, rate_limit) = (
            lock(&self.dedup).stats(),
            lock(&self.limiter).status(&self.tenant_id),
        );
        WorkerReport {
            tenant_id: self.tenant_id.clone(),
            ready: self.is_ready(),
            lifecycle: *self.committed.lock().await,
            heartbeat_running: self.heartbeat.is_running(),
            queued_tasks: self.queues.total_queued(),
            active_chats: self.queues.active_chats(),
            dedup,
            rate_limit,
            reconnect: self.reconnect.status(),
        }
    }

    /// Applies `event` to the committed state and writes the result to the
    /// store. The committed state only advances once the store accepts it.
    async fn commit(
        &self,
        event: LifecycleEvent,
        extras: impl FnOnce(TransitionWrite) -> TransitionWrite,
    ) -> Result<LifecycleState, CourierError> {
        let mut committed = self.committed.lock().await;
        let next = committed.apply(event)?;
        if let Some(rule) = next.inconsistency() {
            warn!(tenant_id = %self.tenant_id, %event, state = %next, rule, "inconsistent lifecycle state");
        }
        let write = extras(committed.writes_to(&next));
        if !write.is_empty() {
            self.store.apply_transition(&self.tenant_id, write).await?;
        }
        debug!(tenant_id = %self.tenant_id, %event, from = %*committed, to = %next, "lifecycle transition committed");
        *committed = next;
        Ok(next)
    }

    async fn on_pairing_code(&self, code: String) {
        info!(tenant_id = %self.tenant_id, "pairing code received");
        match self
            .commit(LifecycleEvent::PairingCodeIssued, |w| w.with_last_qr(Some(code)))
            .await
        {
            Ok(_) => info!(tenant_id = %self.tenant_id, "pairing code saved"),
            Err(e @ CourierError::InvalidTransition { .. }) => {
                warn!(tenant_id = %self.tenant_id, error = %e, "pairing code ignored");
            }
            Err(e) => error!(tenant_id = %self.tenant_id, error = %e, "failed to save pairing code"),
        }
    }

    async fn on_connected(&self) {
        info!(tenant_id = %self.tenant_id, "transport connected");
        self.ready.store(true, Ordering::SeqCst);
        self.reconnect.reset();

        let now = Utc::now();
        let committed = self
            .commit(LifecycleEvent::ConnectionEstablished, |w| {
                w.with_last_qr(None)
                    .with_last_seen(now)
                    .with_last_error(None)
                    .with_worker_status(WorkerStatus::Running)
            })
            .await;
        if let Err(e) = committed {
            error!(tenant_id = %self.tenant_id, error = %e, "failed to update status on connect");
            return;
        }

        match self.store.activate_approved_setup(&self.tenant_id).await {
            Ok(Some(setup_id)) => {
                info!(tenant_id = %self.tenant_id, setup_id = %setup_id, "setup request marked as active");
            }
            Ok(None) => {}
            Err(e) => warn!(tenant_id = %self.tenant_id, error = %e, "failed to activate setup request"),
        }

        let weak = self.me.clone();
        self.heartbeat.start(&self.scheduler, move || {
            let weak = weak.clone();
            async move {
                if let Some(worker) = weak.upgrade() {
                    worker.heartbeat_tick().await;
                }
            }
        });
    }

    async fn on_disconnected(&self, reason: &str) {
        warn!(tenant_id = %self.tenant_id, reason, "transport disconnected");
        self.ready.store(false, Ordering::SeqCst);
        self.heartbeat.stop();

        match self.commit(LifecycleEvent::ConnectionLost, |w| w).await {
            Ok(_) => {}
            Err(e @ CourierError::InvalidTransition { .. }) => {
                debug!(tenant_id = %self.tenant_id, error = %e, "disconnect while not connected");
            }
            Err(e) => {
                error!(tenant_id = %self.tenant_id, error = %e, "failed to update status on disconnect");
            }
        }
        // No-op while halted by a fault or already retrying.
        self.reconnect.start();
    }

    async fn on_auth_failure(&self, detail: &str) {
        error!(tenant_id = %self.tenant_id, detail, "auth failure");
        self.ready.store(false, Ordering::SeqCst);
        self.heartbeat.stop();
        self.reconnect.halt();
        let reason = truncate(&format!("Auth failure: {detail}"));
        if let Err(e) = self
            .commit(LifecycleEvent::Fault, |w| w.with_last_error(Some(reason)))
            .await
        {
            error!(tenant_id = %self.tenant_id, error = %e, "failed to record auth failure");
        }
    }

    async fn reconnect_attempt(&self) -> Result<(), CourierError> {
        info!(tenant_id = %self.tenant_id, "attempting to reconnect");
        if let Err(e) = self.commit(LifecycleEvent::ConnectAttempt, |w| w).await {
            debug!(tenant_id = %self.tenant_id, error = %e, "connect attempt not recorded");
        }
        self.transport.initialize().await
    }

    async fn on_reconnect_exhausted(&self) {
        error!(tenant_id = %self.tenant_id, "max reconnect attempts reached, marking as ERROR");
        if let Err(e) = self
            .commit(LifecycleEvent::ReconnectExhausted, |w| {
                w.with_last_error(Some(RECONNECT_EXHAUSTED_REASON.to_string()))
            })
            .await
        {
            error!(tenant_id = %self.tenant_id, error = %e, "failed to record reconnect exhaustion");
        }
    }

    fn spawn_dedup_sweep(&self) {
        let weak = self.me.clone();
        self.scheduler.spawn_interval(
            self.dedup_sweep_interval,
            self.scheduler.child_token(),
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(worker) = weak.upgrade() {
                        lock(&worker.dedup).sweep_expired();
                    }
                }
            },
        );
    }

    /// Top-level boundary of the message path: failures become the worker's
    /// last error and never escape.
    async fn process_message(&self, message: InboundMessage) -> MessageOutcome {
        match self.try_process(&message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(tenant_id = %self.tenant_id, message_id = %message.id, error = %e, "error handling message");
                let reason = truncate(&format!("Message handling error: {e}"));
                let update = WorkerUpdate {
                    status: None,
                    last_error: Some(Some(reason.clone())),
                };
                if let Err(write) = self.store.update_worker(&self.tenant_id, update).await {
                    error!(tenant_id = %self.tenant_id, error = %write, "failed to log error to store");
                }
                MessageOutcome::Failed(reason)
            }
        }
    }

    async fn try_process(&self, message: &InboundMessage) -> Result<MessageOutcome, CourierError> {
        info!(tenant_id = %self.tenant_id, chat_id = %message.chat_id, message_id = %message.id, "received message");
        let local = message.to.clone().unwrap_or_else(|| "me".to_string());

        self.log_message(MessageLogEntry {
            tenant_id: self.tenant_id.clone(),
            direction: Direction::In,
            from: message.chat_id.to_string(),
            to: local.clone(),
            text: message.text.clone(),
            external_id: Some(message.id.clone()),
        })
        .await;

        let decision = lock(&self.limiter).check_limit(&self.tenant_id);
        if !decision.allowed {
            if decision.warning_already_sent {
                warn!(tenant_id = %self.tenant_id, "rate limit exceeded, suppressing reply");
                return Ok(MessageOutcome::RateLimited { notice_sent: false });
            }
            warn!(tenant_id = %self.tenant_id, "rate limit exceeded, sending warning");
            self.send_notice(message, self.notices.rate_limited.clone()).await;
            return Ok(MessageOutcome::RateLimited { notice_sent: true });
        }

        let text = self.composer.compose(&self.tenant_id, message).await?;
        let sent_id = self
            .transport
            .send_reply(OutboundReply {
                chat_id: message.chat_id.clone(),
                text: text.clone(),
                in_reply_to: message.id.clone(),
            })
            .await?;
        info!(tenant_id = %self.tenant_id, chat_id = %message.chat_id, "sent reply");

        self.log_message(MessageLogEntry {
            tenant_id: self.tenant_id.clone(),
            direction: Direction::Out,
            from: local,
            to: message.chat_id.to_string(),
            text,
            external_id: Some(sent_id.clone()),
        })
        .await;

        let seen = SessionUpdate {
            last_seen_at: Some(Utc::now()),
            ..SessionUpdate::default()
        };
        if let Err(e) = self.store.update_session(&self.tenant_id, seen).await {
            warn!(tenant_id = %self.tenant_id, error = %e, "failed to update last seen");
        }

        Ok(MessageOutcome::Replied(sent_id))
    }

    /// Control notices go straight to the transport and are not rate limited.
    async fn send_notice(&self, message: &InboundMessage, text: String) {
        let reply = OutboundReply {
            chat_id: message.chat_id.clone(),
            text,
            in_reply_to: message.id.clone(),
        };
        if let Err(e) = self.transport.send_reply(reply).await {
            error!(tenant_id = %self.tenant_id, chat_id = %message.chat_id, error = %e, "failed to send notice");
        }
    }

    async fn log_message(&self, entry: MessageLogEntry) {
        let direction = entry.direction;
        if let Err(e) = self.store.append_message(entry).await {
            warn!(tenant_id = %self.tenant_id, %direction, error = %e, "failed to log message");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_LEN).collect()
}
