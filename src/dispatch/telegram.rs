//! # Telegram Bot API sink.
//!
//! Posts `{"chat_id": .., "text": ..}` to `{api}/bot{token}/sendMessage`.
//! Any 2xx is success; other statuses and transport failures are errors.
//! Requests are bounded by a client-wide timeout so a hung endpoint cannot
//! stall a channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{NotificationRequest, Sink};
use crate::error::SinkError;

/// Upper bound on a single `sendMessage` call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest response body kept in a [`SinkError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// [`Sink`] delivering through the Telegram Bot API.
pub struct TelegramSink {
    client: reqwest::Client,
    endpoint: String,
}

impl TelegramSink {
    /// Creates a sink for `token` against the API base `api` (no trailing slash needed).
    pub fn new(api: &str, token: &str) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", api.trim_end_matches('/')),
        })
    }

    /// Full `sendMessage` URL (contains the token).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for TelegramSink {
    async fn send(&self, request: &NotificationRequest) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &request.destination,
                text: &request.text,
            })
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
