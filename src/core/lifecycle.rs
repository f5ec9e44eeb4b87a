//! # Channel lifecycle tracker with sequence-based ordering.
//!
//! Tracks where every channel is in its lifecycle:
//!
//! ```text
//! register()           ChannelProvisioned     ChannelStarted     ChannelStopped
//! Unprovisioned ─────► Provisioned ─────────► Running ─────────► Stopped
//! ```
//!
//! Fed by the supervisor's event listener, so reads are **eventually consistent**.
//! Events with `seq` not newer than the last applied one for a channel are
//! rejected, which keeps out-of-order delivery from resurrecting a stopped channel.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

/// Lifecycle state of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Known, consumer not yet (re)created.
    Unprovisioned,
    /// Consumer created, loop not yet running.
    Provisioned,
    /// Fetch loop running.
    Running,
    /// Fetch loop exited.
    Stopped,
}

#[derive(Debug, Clone)]
struct Entry {
    last_seq: Option<u64>,
    state: ChannelState,
}

/// Thread-safe tracker of channel lifecycle states.
pub struct LifecycleTracker {
    state: RwLock<HashMap<String, Entry>>,
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Declares a channel as [`ChannelState::Unprovisioned`] (no-op if known).
    pub async fn register(&self, channel: &str) {
        self.state
            .write()
            .await
            .entry(channel.to_string())
            .or_insert(Entry {
                last_seq: None,
                state: ChannelState::Unprovisioned,
            });
    }

    /// Applies `ev` if it is newer than the last event seen for its channel.
    ///
    /// Returns `true` when the channel's state changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let next = match ev.kind {
            EventKind::ChannelProvisioned => ChannelState::Provisioned,
            EventKind::ChannelStarted => ChannelState::Running,
            EventKind::ChannelStopped => ChannelState::Stopped,
            _ => return false,
        };
        let Some(name) = ev.channel.as_deref() else {
            return false;
        };

        let mut state = self.state.write().await;
        let entry = state.entry(name.to_string()).or_insert(Entry {
            last_seq: None,
            state: ChannelState::Unprovisioned,
        });
        if entry.last_seq.is_some_and(|last| ev.seq <= last) {
            return false;
        }
        entry.last_seq = Some(ev.seq);
        let changed = entry.state != next;
        entry.state = next;
        changed
    }

    /// Current state of `channel`, if known.
    pub async fn state(&self, channel: &str) -> Option<ChannelState> {
        self.state.read().await.get(channel).map(|e| e.state)
    }

    /// Sorted names of channels whose loop is running.
    ///
    /// Used to report stuck channels when the shutdown grace is exceeded.
    pub async fn running(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut out: Vec<String> = state
            .iter()
            .filter(|(_, e)| e.state == ChannelState::Running)
            .map(|(name, _)| name.clone())
            .collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, channel: &str) -> Event {
        Event::new(kind).with_channel(channel)
    }

    #[tokio::test]
    async fn walks_through_all_states() {
        let t = LifecycleTracker::new();
        t.register("alerts").await;
        assert_eq!(t.state("alerts").await, Some(ChannelState::Unprovisioned));

        assert!(t.update(&ev(EventKind::ChannelProvisioned, "alerts")).await);
        assert_eq!(t.state("alerts").await, Some(ChannelState::Provisioned));

        assert!(t.update(&ev(EventKind::ChannelStarted, "alerts")).await);
        assert_eq!(t.running().await, vec!["alerts".to_string()]);

        assert!(t.update(&ev(EventKind::ChannelStopped, "alerts")).await);
        assert!(t.running().await.is_empty());
    }

    #[tokio::test]
    async fn stale_events_are_rejected() {
        let t = LifecycleTracker::new();
        let started = ev(EventKind::ChannelStarted, "engine");
        let stopped = ev(EventKind::ChannelStopped, "engine");

        assert!(t.update(&stopped).await);
        assert!(!t.update(&started).await, "older seq must not resurrect");
        assert_eq!(t.state("engine").await, Some(ChannelState::Stopped));
    }

    #[tokio::test]
    async fn message_events_do_not_change_state() {
        let t = LifecycleTracker::new();
        t.update(&ev(EventKind::ChannelStarted, "alerts")).await;
        assert!(!t.update(&ev(EventKind::IterationFailed, "alerts")).await);
        assert_eq!(t.state("alerts").await, Some(ChannelState::Running));
    }

    #[tokio::test]
    async fn register_keeps_existing_state() {
        let t = LifecycleTracker::new();
        t.update(&ev(EventKind::ChannelStarted, "alerts")).await;
        t.register("alerts").await;
        assert_eq!(t.state("alerts").await, Some(ChannelState::Running));
    }
}
