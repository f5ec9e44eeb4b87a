//! # One fetch iteration of a channel.
//!
//! [`run_once`] pulls one bounded batch and walks it in delivery order:
//!
//! ```text
//! fetch(batch_size, fetch_wait)          (cancellable)
//!   ├─ []            ─► Ok(0 fetched)    idle, not an error
//!   └─ [m1, m2, ...]
//!        for each m (stop early if cancelled, current message always completes):
//!          ├─► publish MessageReceived
//!          ├─► delivered > dead_letter_after ? term + MessageDeadLettered, next
//!          ├─► AckMode::AfterSend:  deliver ─► publish MessageDelivered ─► ack ─► MessageAcked
//!          └─► AckMode::BeforeSend: ack ─► MessageAcked ─► deliver ─► MessageDelivered
//!        first Err ─► return Err (rest of the batch stays unacknowledged)
//! ```
//!
//! ## Rules
//! - Nothing is acknowledged before the dispatcher returns under `AfterSend`.
//! - Errors are **not** caught per message: one failure abandons the rest of the
//!   batch, which the bus redelivers after its ack wait.
//! - No events are published for an idle pull.

use tokio_util::sync::CancellationToken;

use crate::bus::{InboundMessage, PullSource};
use crate::channel::ChannelDefinition;
use crate::core::actor::ChannelActorParams;
use crate::dispatch::Dispatcher;
use crate::error::ChannelError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::AckMode;

/// What one iteration did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Iteration {
    /// Messages returned by the pull.
    pub fetched: usize,
    /// Messages delivered and acknowledged (or acknowledged and delivered).
    pub handled: usize,
    /// Messages terminated by the delivery limit.
    pub dead_lettered: usize,
}

/// Executes one fetch/dispatch/ack iteration for `channel`.
pub async fn run_once(
    channel: &ChannelDefinition,
    source: &dyn PullSource,
    dispatcher: &Dispatcher,
    params: &ChannelActorParams,
    bus: &Bus,
    token: &CancellationToken,
) -> Result<Iteration, ChannelError> {
    let batch = tokio::select! {
        res = source.fetch(params.batch_size, params.fetch_wait) => res.map_err(ChannelError::Fetch)?,
        _ = token.cancelled() => return Ok(Iteration::default()),
    };

    let mut it = Iteration {
        fetched: batch.len(),
        ..Iteration::default()
    };
    for msg in &batch {
        if token.is_cancelled() {
            break;
        }
        bus.publish(event(EventKind::MessageReceived, channel, msg.as_ref()));

        if let Some(limit) = params.dead_letter_after {
            if msg.delivered() > u64::from(limit) {
                settle(msg.as_ref(), true).await?;
                bus.publish(
                    event(EventKind::MessageDeadLettered, channel, msg.as_ref())
                        .with_attempt(u32::try_from(msg.delivered()).unwrap_or(u32::MAX))
                        .with_reason(format!("delivery limit {limit} exceeded")),
                );
                it.dead_lettered += 1;
                continue;
            }
        }

        match params.ack_mode {
            AckMode::AfterSend => {
                deliver(channel, dispatcher, msg.as_ref()).await?;
                bus.publish(event(EventKind::MessageDelivered, channel, msg.as_ref()));
                settle(msg.as_ref(), false).await?;
                bus.publish(event(EventKind::MessageAcked, channel, msg.as_ref()));
            }
            AckMode::BeforeSend => {
                settle(msg.as_ref(), false).await?;
                bus.publish(event(EventKind::MessageAcked, channel, msg.as_ref()));
                deliver(channel, dispatcher, msg.as_ref()).await?;
                bus.publish(event(EventKind::MessageDelivered, channel, msg.as_ref()));
            }
        }
        it.handled += 1;
    }
    Ok(it)
}

async fn deliver(
    channel: &ChannelDefinition,
    dispatcher: &Dispatcher,
    msg: &dyn InboundMessage,
) -> Result<(), ChannelError> {
    dispatcher
        .deliver(
            channel.banner(),
            msg.subject(),
            msg.payload(),
            channel.destination(),
        )
        .await
        .map_err(|source| ChannelError::Dispatch {
            subject: msg.subject().to_string(),
            sink: dispatcher.sink_name(),
            source,
        })
}

async fn settle(msg: &dyn InboundMessage, terminate: bool) -> Result<(), ChannelError> {
    let res = if terminate { msg.term().await } else { msg.ack().await };
    res.map_err(|source| ChannelError::Ack {
        subject: msg.subject().to_string(),
        source,
    })
}

fn event(kind: EventKind, channel: &ChannelDefinition, msg: &dyn InboundMessage) -> Event {
    Event::new(kind)
        .with_channel(channel.label_arc())
        .with_subject(msg.subject())
}
