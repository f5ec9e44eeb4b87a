//! # Channel definitions.
//!
//! A [`ChannelDefinition`] binds one JetStream stream (and subject filter) to
//! one notification destination. It is built once at startup and shared
//! read-only by the provisioner, the channel actor and the dispatcher.
//!
//! The relay ships two presets:
//!
//! | label    | stream          | filter      | durable        |
//! |----------|-----------------|-------------|----------------|
//! | `alerts` | `STREAM_ALERTS` | `alerts.>`  | `Quant-Alert`  |
//! | `engine` | `STREAM_ENGINE` | `engine.>`  | `Quant-Engine` |

use std::sync::Arc;

use crate::bus::ConsumerSpec;
use crate::config::Config;

/// Immutable description of one logical channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelDefinition {
    label: Arc<str>,
    stream: String,
    filter_subject: String,
    durable: String,
    destination: String,
    banner: String,
}

impl ChannelDefinition {
    /// Creates a channel definition.
    pub fn new(
        label: impl Into<Arc<str>>,
        stream: impl Into<String>,
        filter_subject: impl Into<String>,
        durable: impl Into<String>,
        destination: impl Into<String>,
        banner: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            stream: stream.into(),
            filter_subject: filter_subject.into(),
            durable: durable.into(),
            destination: destination.into(),
            banner: banner.into(),
        }
    }

    /// Alert channel delivering to `destination`.
    pub fn alerts(destination: impl Into<String>) -> Self {
        Self::new(
            "alerts",
            "STREAM_ALERTS",
            "alerts.>",
            "Quant-Alert",
            destination,
            "⛔️ ALERT Received:",
        )
    }

    /// Engine channel delivering to `destination`.
    pub fn engine(destination: impl Into<String>) -> Self {
        Self::new(
            "engine",
            "STREAM_ENGINE",
            "engine.>",
            "Quant-Engine",
            destination,
            "✳️ Quant Engine:",
        )
    }

    /// Human-readable label, also used as the actor name in events.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Shared handle to the label for event construction.
    pub fn label_arc(&self) -> Arc<str> {
        Arc::clone(&self.label)
    }

    /// Stream the durable consumer lives on.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Subject filter pattern (NATS wildcards allowed).
    pub fn filter_subject(&self) -> &str {
        &self.filter_subject
    }

    /// Durable consumer name.
    pub fn durable(&self) -> &str {
        &self.durable
    }

    /// Notification destination id (chat id).
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// First line of every rendered notification.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Consumer configuration for this channel under the given runtime config.
    pub fn consumer_spec(&self, cfg: &Config) -> ConsumerSpec {
        ConsumerSpec {
            stream: self.stream.clone(),
            durable: self.durable.clone(),
            filter_subject: self.filter_subject.clone(),
            max_ack_pending: cfg.max_ack_pending,
            ack_wait: cfg.ack_wait,
        }
    }
}
