//! # LogWriter: events to `tracing` records.
//!
//! Every record carries an `event_code` field (`0` info, `-1` error) plus the
//! channel and subject when known, so the output can be filtered the same way
//! regardless of the installed `tracing` subscriber.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  event_code=0 channel="alerts" Quant-Alert subscriber starts....
//! INFO  event_code=0 channel="alerts" subject="alerts.price.btc" message received
//! ERROR event_code=-1 channel="alerts" subject="alerts.price.btc" attempt=1 iteration failed: dispatch alerts.price.btc via telegram: sink rejected request with status 500
//! DEBUG event_code=0 channel="alerts" delay_ms=50 backoff scheduled
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber writing every event through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Emits the record for one event on the current dispatcher.
    pub fn record(&self, e: &Event) {
        let code = e.kind.event_code();
        let channel = e.channel.as_deref().unwrap_or("-");
        let subject = e.subject.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ChannelProvisioned => {
                info!(event_code = code, channel, "consumer provisioned: {reason}");
            }
            EventKind::ChannelStarted => {
                info!(event_code = code, channel, "{reason} subscriber starts....");
            }
            EventKind::ChannelStopped => {
                info!(event_code = code, channel, "{reason} subscriber stopped");
            }
            EventKind::MessageReceived => {
                info!(event_code = code, channel, subject, "message received");
            }
            EventKind::MessageDelivered => {
                debug!(event_code = code, channel, subject, "notification delivered");
            }
            EventKind::MessageAcked => {
                debug!(event_code = code, channel, subject, "message acknowledged");
            }
            EventKind::MessageDeadLettered => {
                error!(
                    event_code = code,
                    channel,
                    subject,
                    attempt = ?e.attempt,
                    "message terminated: {reason}"
                );
            }
            EventKind::IterationFailed => {
                error!(
                    event_code = code,
                    channel,
                    subject,
                    attempt = ?e.attempt,
                    "iteration failed: {reason}"
                );
            }
            EventKind::BackoffScheduled => {
                debug!(
                    event_code = code,
                    channel,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    "backoff scheduled"
                );
            }
            EventKind::ShutdownRequested => {
                info!(event_code = code, "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!(event_code = code, "all channels stopped within grace");
            }
            EventKind::GraceExceeded => {
                error!(event_code = code, "shutdown grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                warn!(event_code = code, subscriber = channel, "{reason}");
            }
            EventKind::SubscriberPanicked => {
                error!(event_code = code, subscriber = channel, "subscriber panicked: {reason}");
            }
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        self.record(e);
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
