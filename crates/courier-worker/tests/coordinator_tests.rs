// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the worker lifecycle coordinator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::CourierConfig;
use courier_core::{
    CourierError, Direction, InboundMessage, ReplyComposer, SessionState, StateStore, TenantId,
    TenantSnapshot, TenantStatus, TransportEvent, WorkerStatus,
};
use courier_resilience::TaskHandle;
use courier_test_utils::{inbound, MemoryStore, MockTransport, SetupStatus, StaticComposer};
use courier_worker::{
    InboundOutcome, MessageOutcome, WorkerDeps, WorkerLifecycleCoordinator,
};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

struct Fixture {
    worker: Arc<WorkerLifecycleCoordinator>,
    store: Arc<MemoryStore>,
    transport: Arc<MockTransport>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Fixture {
    async fn snapshot(&self) -> TenantSnapshot {
        self.store
            .snapshot(&tenant())
            .await
            .unwrap()
            .expect("tenant rows should exist")
    }
}

/// Holds every reply until permits are added.
struct GatedComposer {
    gate: Semaphore,
}

impl GatedComposer {
    fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
        }
    }

    fn release(&self) {
        self.gate.add_permits(100);
    }
}

#[async_trait]
impl ReplyComposer for GatedComposer {
    async fn compose(
        &self,
        _tenant: &TenantId,
        message: &InboundMessage,
    ) -> Result<String, CourierError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CourierError::Internal(e.to_string()))?;
        Ok(format!("gated: {}", message.text))
    }
}

fn tenant() -> TenantId {
    TenantId::from("tenant-1")
}

fn fixture(config: CourierConfig, composer: Arc<dyn ReplyComposer>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let (transport, events) = MockTransport::new();
    let transport = Arc::new(transport);
    let worker = WorkerLifecycleCoordinator::new(
        tenant(),
        &config,
        WorkerDeps {
            store: store.clone(),
            transport: transport.clone(),
            composer,
        },
        &CancellationToken::new(),
    );
    Fixture {
        worker,
        store,
        transport,
        events: Some(events),
    }
}

async fn connected(config: CourierConfig, composer: Arc<dyn ReplyComposer>) -> Fixture {
    let f = fixture(config, composer);
    f.worker.start().await.expect("start should succeed");
    f.worker.handle_event(TransportEvent::Connected).await;
    f
}

fn queued(outcome: InboundOutcome) -> TaskHandle<MessageOutcome> {
    match outcome {
        InboundOutcome::Queued(handle) => handle,
        InboundOutcome::Ignored => panic!("expected Queued, got Ignored"),
        InboundOutcome::Duplicate => panic!("expected Queued, got Duplicate"),
        InboundOutcome::QueueFull => panic!("expected Queued, got QueueFull"),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn rate_limited_burst_replies_twice_then_warns_once() {
    let mut config = CourierConfig::default();
    config.rate_limit.max_requests = 2;
    config.rate_limit.window_ms = 1_000;
    let f = connected(config, Arc::new(StaticComposer::default())).await;

    let first = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "one")));
    let second = queued(f.worker.handle_inbound(inbound("m-2", "chat-a", "two")));
    let third = queued(f.worker.handle_inbound(inbound("m-3", "chat-a", "three")));

    assert!(matches!(first.await.unwrap(), MessageOutcome::Replied(_)));
    assert!(matches!(second.await.unwrap(), MessageOutcome::Replied(_)));
    assert_eq!(
        third.await.unwrap(),
        MessageOutcome::RateLimited { notice_sent: true }
    );

    let notice = CourierConfig::default().notices.rate_limited;
    assert_eq!(
        f.transport.sent_texts().await,
        vec!["echo: one".to_string(), "echo: two".to_string(), notice]
    );

    let fourth = queued(f.worker.handle_inbound(inbound("m-4", "chat-a", "four")));
    assert_eq!(
        fourth.await.unwrap(),
        MessageOutcome::RateLimited { notice_sent: false }
    );
    assert_eq!(f.transport.sent_count().await, 3);

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    let fifth = queued(f.worker.handle_inbound(inbound("m-5", "chat-a", "five")));
    assert!(matches!(fifth.await.unwrap(), MessageOutcome::Replied(_)));

    let log = f.store.messages().await;
    let inbound_count = log.iter().filter(|e| e.direction == Direction::In).count();
    let outbound_count = log.iter().filter(|e| e.direction == Direction::Out).count();
    assert_eq!(inbound_count, 5);
    assert_eq!(outbound_count, 3);
}

#[tokio::test(start_paused = true)]
async fn replies_are_logged_in_both_directions() {
    let f = connected(CourierConfig::default(), Arc::new(StaticComposer::default())).await;
    let handle = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "hi")));
    let MessageOutcome::Replied(sent_id) = handle.await.unwrap() else {
        panic!("expected a reply");
    };

    let log = f.store.messages().await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].direction, Direction::In);
    assert_eq!(log[0].from, "chat-a");
    assert_eq!(log[0].to, "me@c.us");
    assert_eq!(log[0].external_id.as_ref().map(|id| id.0.as_str()), Some("m-1"));
    assert_eq!(log[1].direction, Direction::Out);
    assert_eq!(log[1].to, "chat-a");
    assert_eq!(log[1].text, "echo: hi");
    assert_eq!(log[1].external_id, Some(sent_id));

    let replies = f.transport.sent_replies().await;
    assert_eq!(replies[0].in_reply_to.0, "m-1");
    assert!(f.snapshot().await.last_seen_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn pairing_then_connect_commits_every_dimension() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.store.add_setup(&tenant(), "setup-1", SetupStatus::Approved).await;
    f.worker.start().await.unwrap();
    assert_eq!(f.snapshot().await.session_state, SessionState::Connecting);

    f.worker
        .handle_event(TransportEvent::PairingCode("qr-payload".to_string()))
        .await;
    let paired = f.snapshot().await;
    assert_eq!(paired.session_state, SessionState::QrReady);
    assert_eq!(paired.last_qr.as_deref(), Some("qr-payload"));

    f.worker.handle_event(TransportEvent::Connected).await;
    let live = f.snapshot().await;
    assert_eq!(live.tenant_status, TenantStatus::Active);
    assert_eq!(live.worker_status, WorkerStatus::Running);
    assert_eq!(live.session_state, SessionState::Connected);
    assert_eq!(live.last_qr, None);
    assert_eq!(live.last_error, None);
    assert!(live.last_seen_at.is_some());
    assert!(live.lifecycle().is_consistent());
    assert_eq!(f.store.setup_status("setup-1").await, Some(SetupStatus::Active));

    let report = f.worker.status().await;
    assert!(report.ready);
    assert!(report.heartbeat_running);
    assert!(report.lifecycle.is_connected());
}

#[tokio::test(start_paused = true)]
async fn pairing_code_is_ignored_while_connected() {
    let f = connected(CourierConfig::default(), Arc::new(StaticComposer::default())).await;
    f.worker
        .handle_event(TransportEvent::PairingCode("late-qr".to_string()))
        .await;
    let snapshot = f.snapshot().await;
    assert_eq!(snapshot.session_state, SessionState::Connected);
    assert_eq!(snapshot.last_qr, None);
}

#[tokio::test(start_paused = true)]
async fn duplicates_own_messages_and_early_messages_are_dropped() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.worker.start().await.unwrap();
    assert!(matches!(
        f.worker.handle_inbound(inbound("early", "chat-a", "too soon")),
        InboundOutcome::Ignored
    ));

    f.worker.handle_event(TransportEvent::Connected).await;
    let mut own = inbound("own", "chat-a", "from me");
    own.from_me = true;
    assert!(matches!(f.worker.handle_inbound(own), InboundOutcome::Ignored));

    let first = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "hello")));
    assert!(matches!(
        f.worker.handle_inbound(inbound("m-1", "chat-a", "hello")),
        InboundOutcome::Duplicate
    ));
    first.await.unwrap();
    assert_eq!(f.transport.sent_count().await, 1);
    assert_eq!(f.worker.status().await.dedup.size, 1);
}

#[tokio::test(start_paused = true)]
async fn dedup_window_expires_through_the_periodic_sweep() {
    let f = connected(CourierConfig::default(), Arc::new(StaticComposer::default())).await;
    queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "hello")))
        .await
        .unwrap();
    assert_eq!(f.worker.status().await.dedup.size, 1);

    tokio::time::sleep(Duration::from_secs(400)).await;
    assert_eq!(f.worker.status().await.dedup.size, 0);
    assert!(matches!(
        f.worker.handle_inbound(inbound("m-1", "chat-a", "hello")),
        InboundOutcome::Queued(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn full_chat_queue_sends_wait_notice_and_drops_message() {
    let mut config = CourierConfig::default();
    config.queue.max_backlog = 1;
    let composer = Arc::new(GatedComposer::new());
    let f = connected(config, composer.clone()).await;

    let running = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "one")));
    settle().await;
    let waiting = queued(f.worker.handle_inbound(inbound("m-2", "chat-a", "two")));
    assert!(matches!(
        f.worker.handle_inbound(inbound("m-3", "chat-a", "three")),
        InboundOutcome::QueueFull
    ));
    settle().await;
    assert_eq!(
        f.transport.sent_texts().await,
        vec![CourierConfig::default().notices.queue_full]
    );

    let other_chat = queued(f.worker.handle_inbound(inbound("m-4", "chat-b", "other")));
    composer.release();
    assert!(matches!(running.await.unwrap(), MessageOutcome::Replied(_)));
    assert!(matches!(waiting.await.unwrap(), MessageOutcome::Replied(_)));
    assert!(matches!(other_chat.await.unwrap(), MessageOutcome::Replied(_)));

    let texts = f.transport.sent_texts().await;
    assert_eq!(texts.len(), 4);
    assert!(!texts.contains(&"gated: three".to_string()));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_refreshes_liveness_while_connected() {
    let f = connected(CourierConfig::default(), Arc::new(StaticComposer::default())).await;
    let before = f.store.write_count();

    tokio::time::sleep(Duration::from_millis(30_001)).await;
    assert_eq!(f.store.write_count(), before + 2, "one session and one worker write");

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(f.store.write_count(), before + 4);
    assert_eq!(f.snapshot().await.worker_status, WorkerStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn disconnect_backs_off_until_exhausted() {
    let mut config = CourierConfig::default();
    config.reconnect.initial_delay_ms = 1_000;
    config.reconnect.max_attempts = 3;
    let f = connected(config, Arc::new(StaticComposer::default())).await;
    f.transport.set_fail_initialize(true);

    f.worker
        .handle_event(TransportEvent::Disconnected("network".to_string()))
        .await;
    let dropped = f.snapshot().await;
    assert_eq!(dropped.session_state, SessionState::Disconnected);
    assert_eq!(dropped.tenant_status, TenantStatus::Error);
    assert!(!f.worker.is_ready());
    assert!(!f.worker.status().await.heartbeat_running);
    assert!(matches!(
        f.worker.handle_inbound(inbound("m-1", "chat-a", "anyone?")),
        InboundOutcome::Ignored
    ));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    let failed = f.snapshot().await;
    assert_eq!(failed.tenant_status, TenantStatus::Error);
    assert_eq!(failed.worker_status, WorkerStatus::Error);
    assert_eq!(failed.last_error.as_deref(), Some("max reconnect attempts reached"));
    assert_eq!(f.transport.initialize_calls(), 1 + 3);

    let report = f.worker.status().await;
    assert!(report.reconnect.exhausted);
    assert!(!report.reconnect.in_progress);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_restores_the_session() {
    let mut f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    let events = f.events.take().expect("events receiver");
    f.worker.start().await.unwrap();
    let worker = Arc::clone(&f.worker);
    let event_loop = tokio::spawn(async move { worker.run(events).await });

    f.transport.emit(TransportEvent::Connected);
    settle().await;
    assert!(f.worker.is_ready());

    f.transport.set_connect_on_initialize(true);
    f.transport
        .emit(TransportEvent::Disconnected("phone offline".to_string()));
    settle().await;
    assert_eq!(f.snapshot().await.session_state, SessionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    let restored = f.snapshot().await;
    assert_eq!(restored.session_state, SessionState::Connected);
    assert_eq!(restored.tenant_status, TenantStatus::Active);
    assert_eq!(f.transport.initialize_calls(), 2);

    let report = f.worker.status().await;
    assert!(report.ready);
    assert!(report.heartbeat_running);
    assert_eq!(report.reconnect.attempt_count, 0);
    assert!(!report.reconnect.in_progress);

    f.worker.shutdown().await;
    event_loop.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn auth_failure_forces_error_with_detail() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.worker.start().await.unwrap();
    f.worker
        .handle_event(TransportEvent::AuthFailure("session revoked".to_string()))
        .await;

    let snapshot = f.snapshot().await;
    assert_eq!(snapshot.tenant_status, TenantStatus::Error);
    assert_eq!(snapshot.worker_status, WorkerStatus::Error);
    assert_eq!(snapshot.last_error.as_deref(), Some("Auth failure: session revoked"));
    assert!(!f.worker.status().await.reconnect.in_progress);
}

#[tokio::test(start_paused = true)]
async fn disconnect_after_auth_failure_does_not_reconnect() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.worker.start().await.unwrap();
    f.worker
        .handle_event(TransportEvent::AuthFailure("bad creds".to_string()))
        .await;
    f.worker
        .handle_event(TransportEvent::Disconnected("LOGOUT".to_string()))
        .await;

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(f.transport.initialize_calls(), 1);

    let snapshot = f.snapshot().await;
    assert_eq!(snapshot.tenant_status, TenantStatus::Error);
    assert_eq!(snapshot.worker_status, WorkerStatus::Error);
    assert_eq!(snapshot.last_error.as_deref(), Some("Auth failure: bad creds"));

    let reconnect = f.worker.status().await.reconnect;
    assert!(reconnect.halted);
    assert!(!reconnect.in_progress);
}

#[tokio::test(start_paused = true)]
async fn connected_session_dropped_after_auth_failure_stays_down() {
    let f = connected(CourierConfig::default(), Arc::new(StaticComposer::default())).await;
    f.worker
        .handle_event(TransportEvent::AuthFailure("session revoked".to_string()))
        .await;
    assert!(!f.worker.is_ready());
    f.worker
        .handle_event(TransportEvent::Disconnected("LOGOUT".to_string()))
        .await;

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(f.transport.initialize_calls(), 1);
    let snapshot = f.snapshot().await;
    assert_eq!(snapshot.session_state, SessionState::Disconnected);
    assert_eq!(snapshot.worker_status, WorkerStatus::Error);
    assert!(!f.worker.status().await.heartbeat_running);
}

#[tokio::test(start_paused = true)]
async fn failed_start_never_retries_on_disconnect() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.transport.set_fail_initialize(true);
    assert!(f.worker.start().await.is_err());

    f.worker
        .handle_event(TransportEvent::Disconnected("closed".to_string()))
        .await;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(f.transport.initialize_calls(), 1);
    assert!(f.worker.status().await.reconnect.halted);
}

#[tokio::test(start_paused = true)]
async fn transport_start_failure_is_a_fault() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.transport.set_fail_initialize(true);

    let result = f.worker.start().await;
    assert!(matches!(result, Err(CourierError::Transport { .. })));

    let snapshot = f.snapshot().await;
    assert_eq!(snapshot.worker_status, WorkerStatus::Error);
    assert_eq!(snapshot.tenant_status, TenantStatus::Error);
    assert!(snapshot
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("mock initialize failure")));
}

#[tokio::test(start_paused = true)]
async fn handler_failure_is_recorded_and_the_chat_keeps_flowing() {
    let composer = Arc::new(StaticComposer::default());
    let f = connected(CourierConfig::default(), composer.clone()).await;

    composer.set_failing(true);
    let failed = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "one")));
    let MessageOutcome::Failed(reason) = failed.await.unwrap() else {
        panic!("expected failure");
    };
    assert!(reason.starts_with("Message handling error:"));
    assert_eq!(f.snapshot().await.last_error, Some(reason));

    composer.set_failing(false);
    let next = queued(f.worker.handle_inbound(inbound("m-2", "chat-a", "two")));
    assert!(matches!(next.await.unwrap(), MessageOutcome::Replied(_)));
}

#[tokio::test(start_paused = true)]
async fn message_log_failures_do_not_block_replies() {
    let f = connected(CourierConfig::default(), Arc::new(StaticComposer::default())).await;
    f.store.set_fail_message_log(true);
    let handle = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "hi")));
    assert!(matches!(handle.await.unwrap(), MessageOutcome::Replied(_)));
    assert!(f.store.messages().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_store_write_keeps_connection_uncommitted() {
    let f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    f.worker.start().await.unwrap();
    f.store.set_fail_writes(true);
    f.worker.handle_event(TransportEvent::Connected).await;

    let report = f.worker.status().await;
    assert!(report.ready, "transport readiness is tracked separately");
    assert!(!report.lifecycle.is_connected());
    assert!(!report.heartbeat_running);

    f.store.set_fail_writes(false);
    assert_eq!(f.snapshot().await.session_state, SessionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_pending_messages_and_releases_transport() {
    let composer = Arc::new(GatedComposer::new());
    let f = connected(CourierConfig::default(), composer.clone()).await;

    let running = queued(f.worker.handle_inbound(inbound("m-1", "chat-a", "one")));
    settle().await;
    let pending = queued(f.worker.handle_inbound(inbound("m-2", "chat-a", "two")));

    f.worker.shutdown().await;
    assert!(matches!(pending.await, Err(CourierError::QueueCleared)));
    assert!(matches!(running.await, Err(CourierError::QueueCleared)));
    assert!(f.transport.is_destroyed());

    let report = f.worker.status().await;
    assert!(!report.ready);
    assert!(!report.heartbeat_running);
    assert!(!report.reconnect.in_progress);
    assert_eq!(report.queued_tasks, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_token_ends_the_loop_and_shuts_down() {
    let mut f = fixture(CourierConfig::default(), Arc::new(StaticComposer::default()));
    let events = f.events.take().expect("events receiver");
    f.worker.start().await.unwrap();

    let stop = CancellationToken::new();
    let worker = Arc::clone(&f.worker);
    let serving = tokio::spawn({
        let stop = stop.clone();
        async move { worker.run_until(events, stop).await }
    });

    f.transport.emit(TransportEvent::Connected);
    settle().await;
    assert!(f.worker.status().await.heartbeat_running);

    stop.cancel();
    serving.await.unwrap();
    assert!(f.transport.is_destroyed());
    assert!(!f.worker.is_ready());
    assert!(!f.worker.status().await.heartbeat_running);
}
