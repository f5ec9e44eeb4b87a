//! # ChannelActor: resilient loop around one channel.
//!
//! Repeats [`run_once`] until cancelled. No iteration error ever escapes the
//! actor: failures are published, followed by a backoff pause, and the loop
//! resumes.
//!
//! ## Event flow
//! ```text
//! ChannelStarted
//! loop {
//!   ├─► cancelled? ─► break
//!   ├─► run_once(batch_size, fetch_wait, ack_mode)
//!   │       ├─ Ok  ──► failures = 0, continue immediately (idle pull included)
//!   │       └─ Err ──► failures += 1
//!   │                  ├─► publish IterationFailed{ reason, attempt = failures }
//!   │                  ├─► publish BackoffScheduled{ delay = backoff.next(failures - 1) }
//!   │                  └─► sleep(delay) (cancellable)
//! }
//! ChannelStopped
//! ```
//!
//! ## Rules
//! - Iterations run **sequentially** within one actor.
//! - Exactly one error event per failed iteration.
//! - The in-flight message is never interrupted by cancellation; the actor
//!   stops at the next message boundary or during backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::bus::PullSource;
use crate::channel::ChannelDefinition;
use crate::config::Config;
use crate::core::runner::run_once;
use crate::dispatch::Dispatcher;
use crate::events::{Bus, Event, EventKind};
use crate::policies::{AckMode, BackoffPolicy};

/// Per-channel loop parameters, taken from [`Config`] by the supervisor.
#[derive(Clone, Debug)]
pub struct ChannelActorParams {
    /// Messages pulled per iteration (min 1).
    pub batch_size: usize,
    /// Maximum wait of one pull.
    pub fetch_wait: Duration,
    /// Pause schedule after failed iterations.
    pub backoff: BackoffPolicy,
    /// Ack ordering.
    pub ack_mode: AckMode,
    /// Delivery count after which a message is terminated.
    pub dead_letter_after: Option<u32>,
}

impl From<&Config> for ChannelActorParams {
    fn from(cfg: &Config) -> Self {
        Self {
            batch_size: cfg.batch_size_clamped(),
            fetch_wait: cfg.fetch_wait,
            backoff: cfg.backoff,
            ack_mode: cfg.ack_mode,
            dead_letter_after: cfg.dead_letter_after,
        }
    }
}

/// Runs one channel's fetch/dispatch/ack loop with backoff between failures.
pub struct ChannelActor {
    /// Channel this actor serves.
    pub channel: Arc<ChannelDefinition>,
    /// Bound pull consumer.
    pub source: Arc<dyn PullSource>,
    /// Shared dispatcher.
    pub dispatcher: Dispatcher,
    /// Loop parameters.
    pub params: ChannelActorParams,
    /// Internal event bus.
    pub bus: Bus,
}

impl ChannelActor {
    /// Creates a new channel actor.
    pub fn new(
        bus: Bus,
        channel: Arc<ChannelDefinition>,
        source: Arc<dyn PullSource>,
        dispatcher: Dispatcher,
        params: ChannelActorParams,
    ) -> Self {
        Self {
            channel,
            source,
            dispatcher,
            params,
            bus,
        }
    }

    /// Runs until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let label = self.channel.label_arc();
        self.bus.publish(
            Event::new(EventKind::ChannelStarted)
                .with_channel(label.clone())
                .with_reason(self.channel.durable()),
        );

        let mut failures: u32 = 0;
        loop {
            if token.is_cancelled() {
                break;
            }
            let res = run_once(
                &self.channel,
                self.source.as_ref(),
                &self.dispatcher,
                &self.params,
                &self.bus,
                &token,
            )
            .await;

            match res {
                Ok(_) => failures = 0,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.params.backoff.next(failures - 1);

                    let mut failed = Event::new(EventKind::IterationFailed)
                        .with_channel(label.clone())
                        .with_reason(e.to_string())
                        .with_attempt(failures);
                    if let Some(subject) = e.subject() {
                        failed = failed.with_subject(subject);
                    }
                    self.bus.publish(failed);
                    self.bus.publish(
                        Event::new(EventKind::BackoffScheduled)
                            .with_channel(label.clone())
                            .with_attempt(failures)
                            .with_delay(delay),
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => break,
                    }
                }
            }
        }

        self.bus.publish(
            Event::new(EventKind::ChannelStopped)
                .with_channel(label)
                .with_reason(self.channel.durable()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, MessageBus};
    use crate::testing::{count, event_bus, wait_for, RecordingSink};

    const STREAM: &str = "STREAM_ALERTS";
    const DURABLE: &str = "Quant-Alert";

    fn cfg() -> Config {
        Config {
            fetch_wait: Duration::from_millis(20),
            ack_wait: Duration::from_millis(500),
            ..Config::default()
        }
    }

    async fn spawn_actor(
        bus: &InMemoryBus,
        sink: Arc<RecordingSink>,
        events: &Bus,
        token: &CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let channel = ChannelDefinition::alerts("-1001");
        bus.create_consumer(&channel.consumer_spec(&cfg()))
            .await
            .expect("create");
        let source = bus.subscribe(STREAM, DURABLE).await.expect("subscribe");
        let actor = ChannelActor::new(
            events.clone(),
            Arc::new(channel),
            source,
            Dispatcher::new(sink),
            ChannelActorParams::from(&cfg()),
        );
        tokio::spawn(actor.run(token.clone()))
    }

    fn memory_bus() -> InMemoryBus {
        let bus = InMemoryBus::new();
        bus.add_stream(STREAM, &["alerts.>"]);
        bus
    }

    #[tokio::test(start_paused = true)]
    async fn sink_outage_is_retried_until_delivered() {
        let bus = memory_bus();
        let sink = Arc::new(RecordingSink::new());
        let events = event_bus();
        let mut rx = events.subscribe();
        let token = CancellationToken::new();
        let handle = spawn_actor(&bus, sink.clone(), &events, &token).await;

        sink.fail_next(2);
        let seq = bus.publish("alerts.price.btc", r#"{"msg":"BTC>50k"}"#).expect("publish");

        let mut seen = Vec::new();
        assert!(
            wait_for(&mut rx, &mut seen, Duration::from_secs(10), |evs| {
                count(evs, EventKind::MessageAcked) == 1
            })
            .await
        );
        assert_eq!(count(&seen, EventKind::IterationFailed), 2);
        assert_eq!(count(&seen, EventKind::BackoffScheduled), 2);
        let errors = seen.iter().filter(|e| e.kind.is_error()).count();
        assert_eq!(errors, 2, "one error event per failed attempt");
        assert_eq!(sink.attempts(), 3);
        assert_eq!(bus.acked(STREAM, DURABLE), vec![seq]);

        let failed: Vec<&Event> = seen
            .iter()
            .filter(|e| e.kind == EventKind::IterationFailed)
            .collect();
        // Idle pulls while waiting for redelivery reset the counter.
        assert_eq!(failed[0].attempt, Some(1));
        assert_eq!(failed[1].attempt, Some(1));
        assert_eq!(failed[0].subject.as_deref(), Some("alerts.price.btc"));

        token.cancel();
        handle.await.expect("actor exits");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_faults_do_not_stop_the_loop() {
        let bus = memory_bus();
        let sink = Arc::new(RecordingSink::new());
        let events = event_bus();
        let mut rx = events.subscribe();
        let token = CancellationToken::new();
        let handle = spawn_actor(&bus, sink.clone(), &events, &token).await;

        bus.fail_fetches(3);
        bus.publish("alerts.a", "after outage").expect("publish");

        let mut seen = Vec::new();
        assert!(
            wait_for(&mut rx, &mut seen, Duration::from_secs(10), |evs| {
                count(evs, EventKind::MessageAcked) == 1
            })
            .await
        );
        assert_eq!(count(&seen, EventKind::IterationFailed), 3);
        assert!(seen
            .iter()
            .filter(|e| e.kind == EventKind::IterationFailed)
            .all(|e| e.subject.is_none()));

        token.cancel();
        handle.await.expect("actor exits");
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_failures_count_consecutively() {
        let bus = memory_bus();
        let sink = Arc::new(RecordingSink::new());
        let events = event_bus();
        let mut rx = events.subscribe();
        let token = CancellationToken::new();
        bus.fail_fetches(3);
        let handle = spawn_actor(&bus, sink, &events, &token).await;

        let mut seen = Vec::new();
        assert!(
            wait_for(&mut rx, &mut seen, Duration::from_secs(10), |evs| {
                count(evs, EventKind::BackoffScheduled) == 3
            })
            .await
        );
        let attempts: Vec<Option<u32>> = seen
            .iter()
            .filter(|e| e.kind == EventKind::IterationFailed)
            .map(|e| e.attempt)
            .collect();
        assert_eq!(attempts, vec![Some(1), Some(2), Some(3)]);

        token.cancel();
        handle.await.expect("actor exits");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_channel_emits_no_failures() {
        let bus = memory_bus();
        let sink = Arc::new(RecordingSink::new());
        let events = event_bus();
        let mut rx = events.subscribe();
        let token = CancellationToken::new();
        let handle = spawn_actor(&bus, sink, &events, &token).await;

        time::sleep(Duration::from_secs(2)).await;
        token.cancel();
        handle.await.expect("actor exits");

        let seen = crate::testing::drain(&mut rx);
        assert_eq!(count(&seen, EventKind::ChannelStarted), 1);
        assert_eq!(count(&seen, EventKind::ChannelStopped), 1);
        assert_eq!(count(&seen, EventKind::IterationFailed), 0);
        assert_eq!(count(&seen, EventKind::BackoffScheduled), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let bus = memory_bus();
        let sink = Arc::new(RecordingSink::new());
        let events = event_bus();
        let mut rx = events.subscribe();
        let token = CancellationToken::new();

        let channel = ChannelDefinition::alerts("-1001");
        bus.create_consumer(&channel.consumer_spec(&cfg()))
            .await
            .expect("create");
        let source = bus.subscribe(STREAM, DURABLE).await.expect("subscribe");
        let params = ChannelActorParams {
            backoff: BackoffPolicy::fixed(Duration::from_secs(3600)),
            ..ChannelActorParams::from(&cfg())
        };
        let actor = ChannelActor::new(
            events.clone(),
            Arc::new(channel),
            source,
            Dispatcher::new(sink),
            params,
        );
        bus.fail_fetches(1);
        let handle = tokio::spawn(actor.run(token.clone()));

        let mut seen = Vec::new();
        assert!(
            wait_for(&mut rx, &mut seen, Duration::from_secs(5), |evs| {
                count(evs, EventKind::BackoffScheduled) == 1
            })
            .await
        );
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("backoff sleep is cancellable")
            .expect("join");
    }
}
