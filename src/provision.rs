//! # Consumer provisioning.
//!
//! [`Provisioner::ensure`] gives every process start a clean delivery cursor:
//!
//! ```text
//! ensure(spec)
//!   ├─► delete_consumer(stream, durable)
//!   │      ├─ Deleted / Absent ─► continue      (absence is success)
//!   │      └─ Err              ─► RuntimeError::Provision
//!   ├─► create_consumer(spec)  explicit ack, deliver-new, max_ack_pending, ack_wait
//!   │      └─ Err              ─► RuntimeError::Provision
//!   └─► publish ChannelProvisioned
//! ```
//!
//! Errors here are configuration or connectivity problems, not transient ones:
//! the supervisor aborts startup instead of running a channel without a consumer.

use std::sync::Arc;

use crate::bus::{ConsumerDescriptor, ConsumerSpec, DeleteOutcome, MessageBus};
use crate::error::{BusError, RuntimeError};
use crate::events::{Bus, Event, EventKind};

/// Creates (or recreates) durable consumers.
pub struct Provisioner {
    bus: Arc<dyn MessageBus>,
    events: Bus,
}

impl Provisioner {
    /// Creates a provisioner over a shared message bus.
    pub fn new(bus: Arc<dyn MessageBus>, events: Bus) -> Self {
        Self { bus, events }
    }

    /// Deletes any consumer named `spec.durable` on `spec.stream`, then creates it afresh.
    ///
    /// `channel` only labels errors and events.
    pub async fn ensure(
        &self,
        channel: &str,
        spec: &ConsumerSpec,
    ) -> Result<ConsumerDescriptor, RuntimeError> {
        let fail = |source: BusError| RuntimeError::Provision {
            channel: channel.to_string(),
            stream: spec.stream.clone(),
            durable: spec.durable.clone(),
            source,
        };

        let outcome = self
            .bus
            .delete_consumer(&spec.stream, &spec.durable)
            .await
            .map_err(fail)?;
        let descriptor = self.bus.create_consumer(spec).await.map_err(fail)?;

        let replaced = match outcome {
            DeleteOutcome::Deleted => "replaced",
            DeleteOutcome::Absent => "created",
        };
        self.events.publish(
            Event::new(EventKind::ChannelProvisioned)
                .with_channel(channel)
                .with_reason(format!(
                    "{replaced} {}/{} filter={} max_ack_pending={}",
                    descriptor.stream,
                    descriptor.durable,
                    descriptor.filter_subject,
                    descriptor.max_ack_pending
                )),
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AckPolicy, DeliverPolicy, InMemoryBus};
    use crate::testing::{drain, event_bus};
    use std::time::Duration;

    fn alerts_spec() -> ConsumerSpec {
        ConsumerSpec {
            stream: "STREAM_ALERTS".into(),
            durable: "Quant-Alert".into(),
            filter_subject: "alerts.>".into(),
            max_ack_pending: 5000,
            ack_wait: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn ensure_twice_yields_identical_consumer() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        let events = event_bus();
        let mut rx = events.subscribe();
        let provisioner = Provisioner::new(Arc::new(bus.clone()), events);

        let first = provisioner.ensure("alerts", &alerts_spec()).await.expect("first");
        let second = provisioner.ensure("alerts", &alerts_spec()).await.expect("second");

        assert_eq!(first, second);
        assert_eq!(first.ack_policy, AckPolicy::Explicit);
        assert_eq!(first.deliver_policy, DeliverPolicy::New);
        assert_eq!(first.max_ack_pending, 5000);
        assert_eq!(bus.descriptor("STREAM_ALERTS", "Quant-Alert"), Some(second));

        let reasons: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| e.reason.map(|r| r.to_string()))
            .collect();
        assert!(reasons[0].starts_with("created"));
        assert!(reasons[1].starts_with("replaced"));
    }

    #[tokio::test]
    async fn recreation_resets_the_cursor() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        let provisioner = Provisioner::new(Arc::new(bus.clone()), event_bus());

        provisioner.ensure("alerts", &alerts_spec()).await.expect("first");
        bus.publish("alerts.stale", "old").expect("publish");
        assert_eq!(bus.pending("STREAM_ALERTS", "Quant-Alert"), 1);

        provisioner.ensure("alerts", &alerts_spec()).await.expect("second");
        assert_eq!(bus.pending("STREAM_ALERTS", "Quant-Alert"), 0);
    }

    #[tokio::test]
    async fn config_change_is_picked_up() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        let provisioner = Provisioner::new(Arc::new(bus.clone()), event_bus());

        provisioner.ensure("alerts", &alerts_spec()).await.expect("first");
        let changed = ConsumerSpec {
            max_ack_pending: 10,
            ..alerts_spec()
        };
        let d = provisioner.ensure("alerts", &changed).await.expect("second");
        assert_eq!(d.max_ack_pending, 10);
    }

    #[tokio::test]
    async fn missing_stream_is_fatal() {
        let bus = InMemoryBus::new();
        let provisioner = Provisioner::new(Arc::new(bus), event_bus());
        let err = provisioner
            .ensure("alerts", &alerts_spec())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "runtime_provision");
    }

    #[tokio::test]
    async fn create_failure_after_delete_is_fatal() {
        let bus = InMemoryBus::new();
        bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
        bus.fail_creates(1);
        let provisioner = Provisioner::new(Arc::new(bus.clone()), event_bus());

        let err = provisioner
            .ensure("alerts", &alerts_spec())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Provision { ref durable, .. } if durable == "Quant-Alert"));
        assert!(bus.descriptor("STREAM_ALERTS", "Quant-Alert").is_none());
    }
}
