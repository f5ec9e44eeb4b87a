//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::dispatch::{NotificationRequest, Sink};
use crate::error::SinkError;
use crate::events::{Bus, Event, EventKind};

/// Sink that records accepted requests and fails on demand.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<NotificationRequest>>,
    attempts: AtomicUsize,
    fail_next: AtomicU32,
    fail_containing: Mutex<Option<(String, u32)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` sends fail with status 500.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// The next `n` sends whose text contains `needle` fail with status 500.
    pub fn fail_containing(&self, needle: &str, n: u32) {
        *self.fail_containing.lock().unwrap() = Some((needle.to_string(), n));
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self, request: &NotificationRequest) -> bool {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }
        let mut guard = self.fail_containing.lock().unwrap();
        match guard.as_mut() {
            Some((needle, left)) if *left > 0 && request.text.contains(needle.as_str()) => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(request) {
            return Err(SinkError::Rejected {
                status: 500,
                body: "simulated".into(),
            });
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Drains every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

/// Counts events of `kind` in `events`.
pub fn count(events: &[Event], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

/// Waits until `pred` holds on the events seen so far, or `limit` elapses.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<Event>,
    seen: &mut Vec<Event>,
    limit: Duration,
    pred: impl Fn(&[Event]) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while !pred(seen) {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(ev)) => seen.push(ev),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return false,
        }
    }
    true
}

/// Event bus sized for tests.
pub fn event_bus() -> Bus {
    Bus::new(4096)
}
