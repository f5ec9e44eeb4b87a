//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] and is the
//! logging interface injected into every component: the provisioner, each
//! channel actor and the supervisor publish [`Event`]s here, and the
//! supervisor's listener fans them out to subscribers such as
//! [`LogWriter`](crate::LogWriter).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   Provisioner ──┐
//!   Actor alerts ─┼──► Bus ───► subscriber_listener ───► SubscriberSet
//!   Actor engine ─┤ (broadcast)    (in Supervisor)
//!   Supervisor  ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.
//!
//! Not to be confused with the message bus ([`MessageBus`](crate::bus::MessageBus)),
//! which carries the actual notifications.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone; every clone publishes into the same ring buffer.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
