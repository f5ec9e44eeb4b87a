//! # In-memory message bus.
//!
//! [`InMemoryBus`] mimics the JetStream semantics the relay depends on, so the
//! fetch loop, provisioner and supervisor can be exercised without a server:
//!
//! - streams capture subjects; durable consumers filter them;
//! - consumers are **deliver-new**: only messages published after creation;
//! - pulled messages stay *in flight* until acked; after `ack_wait` they are
//!   redelivered with an incremented delivery count;
//! - `max_ack_pending` caps in-flight messages per consumer (`-1` is unlimited);
//! - double acks are no-ops.
//!
//! Fault injection (`fail_fetches`, `fail_acks`, `fail_creates`) and inspection
//! helpers (`acked`, `in_flight`, `descriptor`, ...) make the at-least-once
//! properties observable.
//!
//! Time is read from [`tokio::time::Instant`], so paused-clock tests advance
//! redelivery deadlines deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{
    subject_matches, AckPolicy, ConsumerDescriptor, ConsumerSpec, DeleteOutcome, DeliverPolicy,
    InboundMessage, MessageBus, PullSource,
};
use crate::error::BusError;

type ConsumerKey = (String, String);

#[derive(Clone)]
struct Stored {
    seq: u64,
    subject: Arc<str>,
    payload: Arc<[u8]>,
    delivered: u64,
}

struct InFlight {
    msg: Stored,
    deadline: Instant,
}

struct ConsumerState {
    descriptor: ConsumerDescriptor,
    pending: VecDeque<Stored>,
    in_flight: BTreeMap<u64, InFlight>,
    acked: Vec<u64>,
    terminated: Vec<u64>,
}

impl ConsumerState {
    fn new(descriptor: ConsumerDescriptor) -> Self {
        Self {
            descriptor,
            pending: VecDeque::new(),
            in_flight: BTreeMap::new(),
            acked: Vec::new(),
            terminated: Vec::new(),
        }
    }

    /// Moves expired in-flight messages back to the front of the queue, in sequence order.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired.into_iter().rev() {
            if let Some(f) = self.in_flight.remove(&seq) {
                self.pending.push_front(f.msg);
            }
        }
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.deadline).min()
    }
}

#[derive(Default)]
struct State {
    streams: HashMap<String, Vec<String>>,
    consumers: HashMap<ConsumerKey, ConsumerState>,
    next_seq: u64,
    fetch_faults: u32,
    ack_faults: u32,
    create_faults: u32,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process bus with JetStream-like consumer semantics.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Creates an empty bus with no streams.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Declares a stream capturing the given subject patterns.
    pub fn add_stream(&self, name: &str, subjects: &[&str]) {
        self.inner.lock().streams.insert(
            name.to_string(),
            subjects.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Publishes a message; returns its stream sequence.
    ///
    /// Every existing consumer on the capturing stream whose filter matches
    /// receives it. Consumers created later never see it (deliver-new).
    pub fn publish(&self, subject: &str, payload: impl Into<Vec<u8>>) -> Result<u64, BusError> {
        let mut st = self.inner.lock();
        let stream = st
            .streams
            .iter()
            .find(|(_, subjects)| subjects.iter().any(|p| subject_matches(p, subject)))
            .map(|(name, _)| name.clone())
            .ok_or_else(|| BusError::StreamNotFound(format!("no stream captures {subject}")))?;

        let payload: Vec<u8> = payload.into();
        st.next_seq += 1;
        let stored = Stored {
            seq: st.next_seq,
            subject: Arc::from(subject),
            payload: Arc::from(payload),
            delivered: 0,
        };
        for ((s, _), consumer) in st.consumers.iter_mut() {
            if *s == stream && subject_matches(&consumer.descriptor.filter_subject, subject) {
                consumer.pending.push_back(stored.clone());
            }
        }
        let seq = stored.seq;
        drop(st);
        self.inner.notify.notify_waiters();
        Ok(seq)
    }

    /// The next `n` fetches fail with a transport error.
    pub fn fail_fetches(&self, n: u32) {
        self.inner.lock().fetch_faults = n;
    }

    /// The next `n` acknowledgments fail with a transport error.
    pub fn fail_acks(&self, n: u32) {
        self.inner.lock().ack_faults = n;
    }

    /// The next `n` consumer creations fail.
    pub fn fail_creates(&self, n: u32) {
        self.inner.lock().create_faults = n;
    }

    /// Descriptor of a consumer, if it exists.
    pub fn descriptor(&self, stream: &str, durable: &str) -> Option<ConsumerDescriptor> {
        self.with_consumer(stream, durable, |c| c.descriptor.clone())
    }

    /// Sequences acknowledged on a consumer, in ack order.
    pub fn acked(&self, stream: &str, durable: &str) -> Vec<u64> {
        self.with_consumer(stream, durable, |c| c.acked.clone())
            .unwrap_or_default()
    }

    /// Sequences terminated on a consumer, in order.
    pub fn terminated(&self, stream: &str, durable: &str) -> Vec<u64> {
        self.with_consumer(stream, durable, |c| c.terminated.clone())
            .unwrap_or_default()
    }

    /// Number of delivered-but-unacknowledged messages.
    pub fn in_flight(&self, stream: &str, durable: &str) -> usize {
        self.with_consumer(stream, durable, |c| c.in_flight.len())
            .unwrap_or_default()
    }

    /// Number of messages waiting for (re)delivery, counting expired in-flight ones.
    pub fn pending(&self, stream: &str, durable: &str) -> usize {
        let now = Instant::now();
        self.with_consumer(stream, durable, |c| {
            c.pending.len() + c.in_flight.values().filter(|f| f.deadline <= now).count()
        })
        .unwrap_or_default()
    }

    /// True once [`MessageBus::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    fn with_consumer<T>(
        &self,
        stream: &str,
        durable: &str,
        f: impl FnOnce(&ConsumerState) -> T,
    ) -> Option<T> {
        let st = self.inner.lock();
        st.consumers
            .get(&(stream.to_string(), durable.to_string()))
            .map(f)
    }

    /// One non-blocking pull attempt; `Ok(Err(deadline))` means nothing ready.
    fn try_take(
        &self,
        key: &ConsumerKey,
        batch: usize,
    ) -> Result<Result<Vec<Box<dyn InboundMessage>>, Option<Instant>>, BusError> {
        let mut st = self.inner.lock();
        if st.closed {
            return Err(BusError::Fetch("connection closed".into()));
        }
        if st.fetch_faults > 0 {
            st.fetch_faults -= 1;
            return Err(BusError::Fetch("injected transport failure".into()));
        }
        let consumer = st
            .consumers
            .get_mut(key)
            .ok_or_else(|| BusError::ConsumerNotFound {
                stream: key.0.clone(),
                durable: key.1.clone(),
            })?;

        let now = Instant::now();
        consumer.requeue_expired(now);

        // Negative ceiling means unlimited, as on JetStream.
        let room = usize::try_from(consumer.descriptor.max_ack_pending)
            .unwrap_or(usize::MAX)
            .saturating_sub(consumer.in_flight.len());
        let take = batch.min(room).min(consumer.pending.len());
        if take == 0 {
            return Ok(Err(consumer.earliest_deadline()));
        }

        let ack_wait = consumer.descriptor.ack_wait;
        let mut out: Vec<Box<dyn InboundMessage>> = Vec::with_capacity(take);
        for _ in 0..take {
            let Some(mut msg) = consumer.pending.pop_front() else {
                break;
            };
            msg.delivered += 1;
            consumer.in_flight.insert(
                msg.seq,
                InFlight {
                    msg: msg.clone(),
                    deadline: now + ack_wait,
                },
            );
            out.push(Box::new(MemoryMessage {
                inner: Arc::clone(&self.inner),
                key: key.clone(),
                msg,
            }));
        }
        Ok(Ok(out))
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn delete_consumer(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<DeleteOutcome, BusError> {
        let mut st = self.inner.lock();
        if !st.streams.contains_key(stream) {
            return Err(BusError::StreamNotFound(stream.to_string()));
        }
        let removed = st
            .consumers
            .remove(&(stream.to_string(), durable.to_string()));
        Ok(match removed {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::Absent,
        })
    }

    async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<ConsumerDescriptor, BusError> {
        let mut st = self.inner.lock();
        if st.create_faults > 0 {
            st.create_faults -= 1;
            return Err(BusError::Consumer("injected create failure".into()));
        }
        if !st.streams.contains_key(&spec.stream) {
            return Err(BusError::StreamNotFound(spec.stream.clone()));
        }
        let descriptor = ConsumerDescriptor {
            stream: spec.stream.clone(),
            durable: spec.durable.clone(),
            filter_subject: spec.filter_subject.clone(),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::New,
            max_ack_pending: spec.max_ack_pending,
            ack_wait: spec.ack_wait,
        };
        let key = (spec.stream.clone(), spec.durable.clone());
        match st.consumers.get(&key) {
            Some(existing) if existing.descriptor == descriptor => Ok(descriptor),
            Some(_) => Err(BusError::Consumer(format!(
                "consumer {} already exists with a different configuration",
                spec.durable
            ))),
            None => {
                st.consumers
                    .insert(key, ConsumerState::new(descriptor.clone()));
                Ok(descriptor)
            }
        }
    }

    async fn subscribe(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<Arc<dyn PullSource>, BusError> {
        let key = (stream.to_string(), durable.to_string());
        if !self.inner.lock().consumers.contains_key(&key) {
            return Err(BusError::ConsumerNotFound {
                stream: key.0,
                durable: key.1,
            });
        }
        Ok(Arc::new(MemorySource {
            bus: self.clone(),
            key,
        }))
    }

    async fn close(&self) -> Result<(), BusError> {
        self.inner.lock().closed = true;
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

struct MemorySource {
    bus: InMemoryBus,
    key: ConsumerKey,
}

#[async_trait]
impl PullSource for MemorySource {
    async fn fetch(
        &self,
        batch: usize,
        wait: Duration,
    ) -> Result<Vec<Box<dyn InboundMessage>>, BusError> {
        let expires = Instant::now() + wait;
        loop {
            let notified = self.bus.inner.notify.notified();
            let next_redelivery = match self.bus.try_take(&self.key, batch.max(1))? {
                Ok(msgs) => return Ok(msgs),
                Err(deadline) => deadline,
            };
            if Instant::now() >= expires {
                return Ok(Vec::new());
            }
            let wake = next_redelivery.map_or(expires, |d| d.min(expires));
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }
}

struct MemoryMessage {
    inner: Arc<Inner>,
    key: ConsumerKey,
    msg: Stored,
}

impl MemoryMessage {
    fn settle(&self, terminate: bool) -> Result<(), BusError> {
        let mut st = self.inner.lock();
        if st.ack_faults > 0 {
            st.ack_faults -= 1;
            return Err(BusError::Ack("injected transport failure".into()));
        }
        let Some(consumer) = st.consumers.get_mut(&self.key) else {
            return Ok(());
        };
        let current = consumer
            .in_flight
            .get(&self.msg.seq)
            .is_some_and(|f| f.msg.delivered == self.msg.delivered);
        if current {
            consumer.in_flight.remove(&self.msg.seq);
            if terminate {
                consumer.terminated.push(self.msg.seq);
            } else {
                consumer.acked.push(self.msg.seq);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InboundMessage for MemoryMessage {
    fn subject(&self) -> &str {
        &self.msg.subject
    }

    fn payload(&self) -> &[u8] {
        &self.msg.payload
    }

    fn delivered(&self) -> u64 {
        self.msg.delivered
    }

    async fn ack(&self) -> Result<(), BusError> {
        self.settle(false)
    }

    async fn term(&self) -> Result<(), BusError> {
        self.settle(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ack_wait: Duration) -> ConsumerSpec {
        ConsumerSpec {
            stream: "STREAM_ALERTS".into(),
            durable: "Quant-Alert".into(),
            filter_subject: "alerts.>".into(),
            max_ack_pending: 5000,
            ack_wait,
        }
    }

    async fn bound(bus: &InMemoryBus, ack_wait: Duration) -> Arc<dyn PullSource> {
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        bus.create_consumer(&spec(ack_wait)).await.expect("create");
        bus.subscribe("STREAM_ALERTS", "Quant-Alert")
            .await
            .expect("subscribe")
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_skips_backlog() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        bus.publish("alerts.old", "before").expect("publish");

        bus.create_consumer(&spec(Duration::from_secs(30)))
            .await
            .expect("create");
        let src = bus
            .subscribe("STREAM_ALERTS", "Quant-Alert")
            .await
            .expect("subscribe");
        bus.publish("alerts.new", "after").expect("publish");

        let got = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].subject(), "alerts.new");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_fetch_returns_after_wait() {
        let bus = InMemoryBus::new();
        let src = bound(&bus, Duration::from_secs(30)).await;
        let started = Instant::now();
        let got = src.fetch(100, Duration::from_secs(1)).await.expect("fetch");
        assert!(got.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn unacked_message_is_redelivered_after_ack_wait() {
        let bus = InMemoryBus::new();
        let src = bound(&bus, Duration::from_secs(5)).await;
        bus.publish("alerts.a", "x").expect("publish");

        let first = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        assert_eq!(first[0].delivered(), 1);
        drop(first);

        let none = src.fetch(10, Duration::from_secs(1)).await.expect("fetch");
        assert!(none.is_empty(), "still inside ack wait");

        let again = src.fetch(10, Duration::from_secs(10)).await.expect("fetch");
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].delivered(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn double_ack_is_tolerated() {
        let bus = InMemoryBus::new();
        let src = bound(&bus, Duration::from_secs(5)).await;
        let seq = bus.publish("alerts.a", "x").expect("publish");

        let msgs = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        msgs[0].ack().await.expect("first ack");
        msgs[0].ack().await.expect("second ack");
        assert_eq!(bus.acked("STREAM_ALERTS", "Quant-Alert"), vec![seq]);
    }

    #[tokio::test(start_paused = true)]
    async fn max_ack_pending_bounds_in_flight() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        bus.create_consumer(&ConsumerSpec {
            max_ack_pending: 3,
            ..spec(Duration::from_secs(30))
        })
        .await
        .expect("create");
        let src = bus
            .subscribe("STREAM_ALERTS", "Quant-Alert")
            .await
            .expect("subscribe");
        for i in 0..5 {
            bus.publish(&format!("alerts.{i}"), "x").expect("publish");
        }

        let first = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        assert_eq!(first.len(), 3);
        let blocked = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        assert!(blocked.is_empty());

        first[0].ack().await.expect("ack");
        let next = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        assert_eq!(next.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_max_ack_pending_is_unlimited() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        bus.create_consumer(&ConsumerSpec {
            max_ack_pending: -1,
            ..spec(Duration::from_secs(30))
        })
        .await
        .expect("create");
        let src = bus
            .subscribe("STREAM_ALERTS", "Quant-Alert")
            .await
            .expect("subscribe");
        for i in 0..5 {
            bus.publish(&format!("alerts.{i}"), "x").expect("publish");
        }

        let got = src.fetch(10, Duration::from_millis(10)).await.expect("fetch");
        assert_eq!(got.len(), 5);
    }

    #[tokio::test]
    async fn publish_wakes_a_waiting_fetch() {
        let bus = InMemoryBus::new();
        let src = bound(&bus, Duration::from_secs(30)).await;
        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("alerts.late", "x").expect("publish");
        });
        let got = src.fetch(10, Duration::from_secs(5)).await.expect("fetch");
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn create_with_conflicting_config_fails() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        bus.create_consumer(&spec(Duration::from_secs(30)))
            .await
            .expect("create");
        let err = bus
            .create_consumer(&spec(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "bus_consumer");
    }
}
