//! # relayvisor
//!
//! **Relayvisor** is a supervised relay from NATS JetStream streams to a chat
//! notification sink (Telegram), with at-least-once delivery.
//!
//! Each logical channel binds one stream and subject filter to one destination.
//! At startup the durable consumer of every channel is recreated; afterwards a
//! channel actor loops pull → render → send → acknowledge. A message is
//! acknowledged only after the sink accepted it, so a failure anywhere leaves it
//! to be redelivered by the server.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌────────────────────┐              ┌────────────────────┐
//!     │ ChannelDefinition  │              │ ChannelDefinition  │
//!     │ alerts.> → chat A  │              │ engine.> → chat B  │
//!     └─────────┬──────────┘              └─────────┬──────────┘
//!               ▼                                   ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - Provisioner (delete + create durable consumer, fatal on error) │
//! │  - Bus (broadcast events)                                         │
//! │  - LifecycleTracker (Unprovisioned → Provisioned → Running)       │
//! │  - SubscriberSet (fans out to LogWriter and user subscribers)     │
//! └──────────┬───────────────────────────────────────┬────────────────┘
//!            ▼                                       ▼
//!     ┌──────────────┐                        ┌──────────────┐
//!     │ ChannelActor │                        │ ChannelActor │
//!     │ (fetch loop) │                        │ (fetch loop) │
//!     └──────┬───────┘                        └──────┬───────┘
//!            │ PullSource::fetch(batch, wait)         │
//!            │ Dispatcher::deliver ─► Sink::send      │
//!            │ InboundMessage::ack                    │
//!            ▼                                        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Bus (runtime events, broadcast channel)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───┬────────────────┬───┘
//!                           ▼                ▼
//!                  LifecycleTracker    SubscriberSet ─► LogWriter ─► tracing
//! ```
//!
//! ### Channel loop
//! ```text
//! loop {
//!   ├─► fetch up to batch_size, wait up to fetch_wait
//!   │       └─ empty ─► next iteration (not an error)
//!   ├─► for each message, in order:
//!   │       ├─► decode + render + sink.send
//!   │       └─► ack
//!   └─► any Err ─► IterationFailed, BackoffScheduled, sleep, continue
//!                  (remaining messages of the batch stay unacknowledged)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Channels**      | Stream/filter/durable/destination bindings                | [`ChannelDefinition`]                       |
//! | **Message bus**   | JetStream and in-memory consumer backends                 | [`MessageBus`], [`NatsBus`], [`InMemoryBus`]|
//! | **Dispatch**      | Payload decoding, rendering and sink delivery            | [`Dispatcher`], [`Sink`], [`TelegramSink`]  |
//! | **Supervision**   | Provisioning, channel actors, graceful shutdown          | [`Supervisor`], [`LifecycleTracker`]        |
//! | **Policies**      | Backoff, jitter and ack ordering                         | [`BackoffPolicy`], [`AckMode`]              |
//! | **Subscribers**   | Event hooks; structured logging                          | [`Subscribe`], [`LogWriter`]                |
//! | **Errors**        | Typed errors per layer                                   | [`ChannelError`], [`RuntimeError`]          |
//! | **Configuration** | Runtime knobs and environment settings                   | [`Config`], [`Settings`]                    |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use relayvisor::{ChannelDefinition, Config, InMemoryBus, LogWriter, Subscribe, Supervisor};
//! # use relayvisor::{NotificationRequest, Sink, SinkError};
//! # struct Stdout;
//! # #[async_trait::async_trait]
//! # impl Sink for Stdout {
//! #     async fn send(&self, r: &NotificationRequest) -> Result<(), SinkError> {
//! #         println!("{}", r.text);
//! #         Ok(())
//! #     }
//! # }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = InMemoryBus::new();
//!     bus.add_stream("STREAM_ALERTS", &["alerts.>"]);
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let sup = Supervisor::builder(Config::default(), Arc::new(bus), Arc::new(Stdout))
//!         .with_subscribers(subs)
//!         .build();
//!
//!     // Stop after a moment; in production `sup.run(..)` waits for SIGINT/SIGTERM.
//!     let shutdown = tokio::time::sleep(Duration::from_millis(50));
//!     sup.run_until(vec![ChannelDefinition::alerts("-1001")], shutdown).await?;
//!     Ok(())
//! }
//! ```

mod bus;
mod channel;
mod config;
mod core;
mod dispatch;
mod error;
mod events;
mod policies;
mod provision;
mod subscribers;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use bus::{
    subject_matches, AckPolicy, ConsumerDescriptor, ConsumerSpec, DeleteOutcome, DeliverPolicy,
    InMemoryBus, InboundMessage, MessageBus, NatsBus, PullSource,
};
pub use channel::ChannelDefinition;
pub use config::{Config, Settings, TELEGRAM_API};
pub use self::core::{ChannelState, LifecycleTracker, Supervisor, SupervisorBuilder};
pub use dispatch::{decode_payload, render, Dispatcher, NotificationRequest, Sink, TelegramSink};
pub use error::{BusError, ChannelError, ConfigError, DispatchError, RuntimeError, SinkError};
pub use events::{Bus, Event, EventKind, EVENT_CODE_ERROR, EVENT_CODE_INFO};
pub use policies::{AckMode, BackoffPolicy, JitterPolicy};
pub use provision::Provisioner;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
