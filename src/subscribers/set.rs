//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`] to every subscriber **without
//! awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and published as `SubscriberPanicked`.
//!   That event is never delivered back to the subscriber that panicked.
//! - [`SubscriberSet::shutdown`] waits until every queued event was handled.
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on queue overflow (the event is dropped for that subscriber
//!   and `SubscriberOverflow` is published).
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Panics and overflows are reported on `bus`.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let worker_bus = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        // A panic while handling a panic report is logged, not republished.
                        if ev.kind == EventKind::SubscriberPanicked {
                            tracing::error!(
                                event_code = -1,
                                subscriber = sub.name(),
                                "subscriber panicked on a panic report: {info}"
                            );
                        } else {
                            worker_bus.publish(Event::subscriber_panicked(sub.name(), info));
                        }
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Fan-out one event to all subscribers (non-blocking).
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        let is_overflow_evt = event.kind == EventKind::SubscriberOverflow;
        let panicked = match event.kind {
            EventKind::SubscriberPanicked => event.channel.as_deref(),
            _ => None,
        };

        for channel in &self.channels {
            if panicked == Some(channel.name) {
                continue;
            }
            let reason = match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(subscriber = channel.name, reason, "subscriber dropped event");
            if !is_overflow_evt {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Closes all queues and waits until workers drained them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{count, drain, event_bus};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    struct Slow;

    #[async_trait]
    impl Subscribe for Slow {
        async fn on_event(&self, _ev: &Event) {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        fn name(&self) -> &'static str {
            "slow"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_events_in_order() {
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![collect.clone()], event_bus());
        assert_eq!(set.len(), 1);

        set.emit(&Event::new(EventKind::ChannelStarted));
        set.emit(&Event::new(EventKind::MessageReceived));
        set.emit(&Event::new(EventKind::ChannelStopped));
        set.shutdown().await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![
                EventKind::ChannelStarted,
                EventKind::MessageReceived,
                EventKind::ChannelStopped
            ]
        );
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated() {
        let bus = event_bus();
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![Arc::new(Panicky), collect.clone()], bus);

        set.emit(&Event::new(EventKind::ChannelStarted));
        set.emit(&Event::new(EventKind::ChannelStopped));
        set.shutdown().await;

        assert_eq!(collect.0.lock().unwrap().len(), 2);
        assert_eq!(count(&drain(&mut rx), EventKind::SubscriberPanicked), 2);
    }

    #[tokio::test]
    async fn panic_reports_are_not_republished() {
        let bus = event_bus();
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![Arc::new(Panicky), collect.clone()], bus);

        set.emit(&Event::subscriber_panicked("panicky", "boom".into()));
        set.emit(&Event::subscriber_panicked("collect", "boom".into()));
        set.shutdown().await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![EventKind::SubscriberPanicked]
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_reports_overflow() {
        let bus = event_bus();
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Slow)], bus);

        for _ in 0..5 {
            set.emit(&Event::new(EventKind::MessageReceived));
        }
        let overflow = drain(&mut rx);
        assert!(count(&overflow, EventKind::SubscriberOverflow) >= 3);
        assert!(overflow
            .iter()
            .all(|e| e.channel.as_deref() == Some("slow")));
    }
}
