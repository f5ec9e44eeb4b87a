//! # Dispatcher: message → notification → sink.
//!
//! [`Dispatcher::deliver`] turns one inbound message into a
//! [`NotificationRequest`] and hands it to a [`Sink`] exactly once:
//!
//! ```text
//! (subject, payload, destination)
//!      ├─► decode_payload(payload)      utf-8, then JSON-aware text extraction
//!      ├─► render(banner, subject, body)
//!      └─► sink.send(&request)           single call, no retry
//! ```
//!
//! Retrying is not the dispatcher's business: a failure leaves the message
//! unacknowledged and the bus redelivers it after its ack wait.

mod telegram;

pub use telegram::TelegramSink;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DispatchError, SinkError};

/// One notification ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationRequest {
    /// Destination id (chat id).
    pub destination: String,
    /// Rendered text body.
    pub text: String,
}

/// External notification endpoint.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Delivers one request; `Ok` only when the endpoint accepted it.
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError>;

    /// Short name used in logs and dispatch errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Renders messages and forwards them to a shared [`Sink`].
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn Sink>,
}

impl Dispatcher {
    /// Creates a dispatcher over `sink`.
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// Name of the underlying sink.
    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Builds the request for one message without sending it.
    pub fn prepare(
        &self,
        banner: &str,
        subject: &str,
        payload: &[u8],
        destination: &str,
    ) -> Result<NotificationRequest, DispatchError> {
        let body = decode_payload(subject, payload)?;
        Ok(NotificationRequest {
            destination: destination.to_string(),
            text: render(banner, subject, &body),
        })
    }

    /// Decodes, renders and sends one message.
    pub async fn deliver(
        &self,
        banner: &str,
        subject: &str,
        payload: &[u8],
        destination: &str,
    ) -> Result<(), DispatchError> {
        let request = self.prepare(banner, subject, payload, destination)?;
        self.sink.send(&request).await?;
        Ok(())
    }
}

/// Extracts display text from a payload.
///
/// - not UTF-8 → [`DispatchError::Decode`]
/// - JSON string → the string
/// - JSON object with a string `msg` / `message` / `text` field → that field
/// - other JSON → pretty-printed
/// - anything else → the raw text
pub fn decode_payload(subject: &str, payload: &[u8]) -> Result<String, DispatchError> {
    let text = std::str::from_utf8(payload).map_err(|e| DispatchError::Decode {
        subject: subject.to_string(),
        reason: e.to_string(),
    })?;

    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Ok(text.to_string());
    };
    Ok(match value {
        Value::String(s) => s,
        Value::Object(ref map) => ["msg", "message", "text"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| pretty(&value, text)),
        other => pretty(&other, text),
    })
}

fn pretty(value: &Value, fallback: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| fallback.to_string())
}

/// Renders the notification text.
pub fn render(banner: &str, subject: &str, body: &str) -> String {
    format!("{banner}\n\nReceived from: \n{subject}\n\nBody: \n{body}")
}
