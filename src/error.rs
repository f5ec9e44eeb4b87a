//! Error types used by the relay runtime, its channels and its collaborators.
//!
//! The enums are layered by blast radius:
//!
//! - [`ConfigError`]: process configuration could not be loaded.
//! - [`BusError`]: the message bus rejected or failed an operation.
//! - [`SinkError`]: the notification sink rejected or failed a delivery.
//! - [`DispatchError`]: a message could not be turned into a delivered notification.
//! - [`ChannelError`]: one fetch iteration of a channel failed (recoverable).
//! - [`RuntimeError`]: the process itself cannot continue (startup or shutdown).
//!
//! Every enum exposes `as_label` for stable snake_case labels in logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors raised while loading process configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("missing required setting {key}")]
    Missing {
        /// Variable name.
        key: &'static str,
    },

    /// A variable is present but cannot be parsed.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value as found in the environment.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Missing { .. } => "config_missing",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by a [`MessageBus`](crate::bus::MessageBus) implementation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Connecting or authenticating to the bus failed.
    #[error("bus connect failed: {0}")]
    Connect(String),

    /// The referenced stream does not exist.
    #[error("stream {0} not found")]
    StreamNotFound(String),

    /// The referenced durable consumer does not exist.
    #[error("consumer {durable} not found on stream {stream}")]
    ConsumerNotFound {
        /// Stream name.
        stream: String,
        /// Durable consumer name.
        durable: String,
    },

    /// A consumer management request (create/delete/lookup) failed.
    #[error("consumer request failed: {0}")]
    Consumer(String),

    /// Pulling a batch failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Acknowledging (or terminating) a message failed.
    #[error("ack failed: {0}")]
    Ack(String),

    /// Closing or flushing the connection failed.
    #[error("close failed: {0}")]
    Close(String),
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Connect(_) => "bus_connect",
            BusError::StreamNotFound(_) => "bus_stream_not_found",
            BusError::ConsumerNotFound { .. } => "bus_consumer_not_found",
            BusError::Consumer(_) => "bus_consumer",
            BusError::Fetch(_) => "bus_fetch",
            BusError::Ack(_) => "bus_ack",
            BusError::Close(_) => "bus_close",
        }
    }
}

/// # Errors produced by a [`Sink`](crate::dispatch::Sink).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The request never got a response (DNS, connect, TLS, timeout).
    #[error("sink unreachable: {0}")]
    Transport(String),

    /// The sink answered with a non-success status.
    #[error("sink rejected request with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },
}

impl SinkError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Transport(_) => "sink_transport",
            SinkError::Rejected { .. } => "sink_rejected",
        }
    }
}

/// # Errors produced by the [`Dispatcher`](crate::dispatch::Dispatcher).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Payload is not valid UTF-8.
    #[error("payload of {subject} is not valid utf-8: {reason}")]
    Decode {
        /// Subject the payload arrived on.
        subject: String,
        /// Decoder message.
        reason: String,
    },

    /// The sink refused or could not be reached.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Decode { .. } => "dispatch_decode",
            DispatchError::Sink(e) => e.as_label(),
        }
    }
}

/// # Errors that abort one fetch iteration of a channel.
///
/// All of them are recoverable: the channel actor logs, backs off and resumes.
/// Messages left unacknowledged are redelivered by the bus after its ack wait.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Pulling the batch failed.
    #[error("fetch: {0}")]
    Fetch(BusError),

    /// Decoding or delivering a message failed.
    #[error("dispatch {subject} via {sink}: {source}")]
    Dispatch {
        /// Subject of the failing message.
        subject: String,
        /// Name of the sink that was used.
        sink: &'static str,
        /// Underlying failure.
        #[source]
        source: DispatchError,
    },

    /// Acknowledging a message failed after it was handled.
    #[error("ack {subject}: {source}")]
    Ack {
        /// Subject of the failing message.
        subject: String,
        /// Underlying failure.
        #[source]
        source: BusError,
    },
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Fetch(_) => "channel_fetch",
            ChannelError::Dispatch { source, .. } => source.as_label(),
            ChannelError::Ack { .. } => "channel_ack",
        }
    }

    /// Subject of the message the failure is tied to, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            ChannelError::Fetch(_) => None,
            ChannelError::Dispatch { subject, .. } | ChannelError::Ack { subject, .. } => {
                Some(subject.as_str())
            }
        }
    }
}

/// # Errors that stop the relay process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A channel's durable consumer could not be (re)created at startup.
    #[error("provisioning {channel} ({stream}/{durable}) failed: {source}")]
    Provision {
        /// Channel label.
        channel: String,
        /// Stream name.
        stream: String,
        /// Durable consumer name.
        durable: String,
        /// Bus failure.
        #[source]
        source: BusError,
    },

    /// A provisioned consumer could not be bound for pulling.
    #[error("subscribing {channel} failed: {source}")]
    Subscribe {
        /// Channel label.
        channel: String,
        /// Bus failure.
        #[source]
        source: BusError,
    },

    /// Shutdown grace period was exceeded; some channels were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Channels that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use relayvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Provision { .. } => "runtime_provision",
            RuntimeError::Subscribe { .. } => "runtime_subscribe",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
