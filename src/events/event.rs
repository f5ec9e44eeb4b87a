//! # Runtime events emitted by the supervisor and channel actors.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Channel lifecycle**: provisioning and start/stop of a channel actor
//! - **Message flow**: receipt, delivery, acknowledgment, dead-lettering
//! - **Failure handling**: failed iterations and scheduled backoff
//! - **Shutdown / subscribers**: process-level and fan-out bookkeeping
//!
//! Every kind maps to a stable numeric [`EventKind::event_code`]: `0` for
//! informational events and `-1` for errors. Log subscribers carry that code
//! into every record so downstream tooling can filter on it.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use relayvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::IterationFailed)
//!     .with_channel("alerts")
//!     .with_reason("fetch: connection reset")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_millis(50));
//!
//! assert_eq!(ev.kind.event_code(), -1);
//! assert_eq!(ev.channel.as_deref(), Some("alerts"));
//! assert_eq!(ev.delay_ms, Some(50));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Event code for informational records.
pub const EVENT_CODE_INFO: i32 = 0;
/// Event code for error records.
pub const EVENT_CODE_ERROR: i32 = -1;

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `channel` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `channel` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// All channel actors stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some channels did not stop in time.
    GraceExceeded,

    // === Channel lifecycle ===
    /// Durable consumer was (re)created for a channel.
    ///
    /// Sets: `channel`, `reason` (`stream/durable`).
    ChannelProvisioned,

    /// Channel actor entered its fetch loop.
    ///
    /// Sets: `channel`, `reason` (durable name).
    ChannelStarted,

    /// Channel actor left its fetch loop (cancellation).
    ///
    /// Sets: `channel`, `reason` (durable name).
    ChannelStopped,

    // === Message flow ===
    /// A message was pulled from the bus.
    ///
    /// Sets: `channel`, `subject`.
    MessageReceived,

    /// The sink accepted the notification for a message.
    ///
    /// Sets: `channel`, `subject`.
    MessageDelivered,

    /// A message was acknowledged on the bus.
    ///
    /// Sets: `channel`, `subject`.
    MessageAcked,

    /// A message exceeded the delivery limit and was terminated without dispatch.
    ///
    /// Sets: `channel`, `subject`, `attempt` (server delivery count).
    MessageDeadLettered,

    // === Failure handling ===
    /// One fetch iteration failed; the rest of its batch stays unacknowledged.
    ///
    /// Sets: `channel`, `reason`, `attempt` (consecutive failures), `subject` if
    /// the failure is tied to one message.
    IterationFailed,

    /// Next iteration delayed after a failure.
    ///
    /// Sets: `channel`, `delay_ms`, `attempt`.
    BackoffScheduled,
}

impl EventKind {
    /// Stable numeric code carried into log records.
    pub fn event_code(self) -> i32 {
        match self {
            EventKind::SubscriberPanicked
            | EventKind::GraceExceeded
            | EventKind::MessageDeadLettered
            | EventKind::IterationFailed => EVENT_CODE_ERROR,
            _ => EVENT_CODE_INFO,
        }
    }

    /// True for kinds that represent an error condition.
    #[inline]
    pub fn is_error(self) -> bool {
        self.event_code() == EVENT_CODE_ERROR
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Channel label (or subscriber name for subscriber events).
    pub channel: Option<Arc<str>>,
    /// Subject of the message involved, if any.
    pub subject: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt / delivery counter (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before the next iteration in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            subject: None,
            reason: None,
            attempt: None,
            delay_ms: None,
        }
    }

    /// Attaches a channel label.
    #[inline]
    pub fn with_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Attaches a message subject.
    #[inline]
    pub fn with_subject(mut self, subject: impl Into<Arc<str>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_channel(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_channel(subscriber)
            .with_reason(info)
    }
}
