//! # Message bus contract.
//!
//! The relay consumes the bus through three traits so that the fetch loop can
//! run against JetStream in production and against [`InMemoryBus`] in tests:
//!
//! - [`MessageBus`] connection-level operations: consumer delete/create,
//!   pull subscription, close.
//! - [`PullSource`] one bound durable consumer: `fetch(batch, wait)`.
//! - [`InboundMessage`] one delivery: subject, payload, single-use ack.
//!
//! ```text
//! MessageBus ──delete/create──► ConsumerDescriptor      (setup)
//!     └────────subscribe──────► PullSource ──fetch──► [InboundMessage]   (steady state)
//!                                                         └── ack / term
//! ```
//!
//! ## Contract
//! - Consumers are always created with **explicit** acknowledgment and the
//!   **deliver-new** policy; [`ConsumerSpec`] only carries what varies.
//! - `fetch` returns an empty vector when nothing arrives within `wait`; that is
//!   not an error.
//! - Acknowledging twice must not panic; implementations return `Ok` or an error.

mod memory;
mod nats;

pub use memory::InMemoryBus;
pub use nats::NatsBus;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BusError;

/// Acknowledgment policy of a durable consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckPolicy {
    /// Each message is acknowledged individually by the client.
    Explicit,
}

/// Starting point of a durable consumer's cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliverPolicy {
    /// Only messages published after the consumer was created.
    New,
}

/// What varies between the relay's durable consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerSpec {
    /// Stream the consumer is created on.
    pub stream: String,
    /// Durable consumer name.
    pub durable: String,
    /// Subject filter (NATS wildcards allowed).
    pub filter_subject: String,
    /// Ceiling on delivered-but-unacknowledged messages.
    pub max_ack_pending: i64,
    /// Redelivery window for unacknowledged messages.
    pub ack_wait: Duration,
}

/// Server-side durable consumer state, as reported after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerDescriptor {
    /// Stream name.
    pub stream: String,
    /// Durable consumer name.
    pub durable: String,
    /// Subject filter.
    pub filter_subject: String,
    /// Always [`AckPolicy::Explicit`].
    pub ack_policy: AckPolicy,
    /// Always [`DeliverPolicy::New`].
    pub deliver_policy: DeliverPolicy,
    /// Ceiling on delivered-but-unacknowledged messages.
    pub max_ack_pending: i64,
    /// Redelivery window.
    pub ack_wait: Duration,
}

/// Outcome of a consumer delete request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A consumer existed and was removed.
    Deleted,
    /// No consumer with that name existed.
    Absent,
}

/// Connection-level bus operations.
///
/// One instance is shared (via `Arc`) by the provisioner and every channel.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Deletes a durable consumer; a missing consumer is [`DeleteOutcome::Absent`].
    async fn delete_consumer(&self, stream: &str, durable: &str)
        -> Result<DeleteOutcome, BusError>;

    /// Creates a durable pull consumer (explicit ack, deliver-new).
    async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<ConsumerDescriptor, BusError>;

    /// Binds an existing durable consumer for pulling.
    async fn subscribe(&self, stream: &str, durable: &str)
        -> Result<Arc<dyn PullSource>, BusError>;

    /// Flushes pending acknowledgments and releases the connection.
    async fn close(&self) -> Result<(), BusError>;
}

/// A bound durable pull consumer.
#[async_trait]
pub trait PullSource: Send + Sync {
    /// Pulls up to `batch` messages, waiting at most `wait`; empty on timeout.
    async fn fetch(&self, batch: usize, wait: Duration)
        -> Result<Vec<Box<dyn InboundMessage>>, BusError>;
}

/// One delivery of a message.
#[async_trait]
pub trait InboundMessage: Send + Sync {
    /// Subject the message was published on.
    fn subject(&self) -> &str;

    /// Opaque payload.
    fn payload(&self) -> &[u8];

    /// How many times the server has delivered this message (1 on first delivery).
    fn delivered(&self) -> u64;

    /// Positive acknowledgment.
    async fn ack(&self) -> Result<(), BusError>;

    /// Tells the server to stop redelivering this message.
    async fn term(&self) -> Result<(), BusError>;
}

/// NATS subject matching: `*` matches one token, a trailing `>` one or more.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut pattern = filter.split('.');
    let mut tokens = subject.split('.');
    loop {
        match (pattern.next(), tokens.next()) {
            (Some(">"), Some(_)) => return pattern.next().is_none(),
            (Some("*"), Some(t)) if !t.is_empty() => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
