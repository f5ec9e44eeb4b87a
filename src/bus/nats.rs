//! # JetStream adapter.
//!
//! Thin pass-through from the [`MessageBus`] contract to `async-nats`:
//!
//! ```text
//! delete_consumer ─► Stream::delete_consumer     (CONSUMER_NOT_FOUND → Absent)
//! create_consumer ─► Stream::create_consumer(pull::Config { explicit, new, .. })
//! subscribe       ─► Stream::get_consumer::<pull::Config>
//! fetch           ─► Consumer::batch().max_messages(n).expires(wait)
//! ack / term      ─► Message::ack / Message::ack_with(AckKind::Term)
//! close           ─► Client::flush
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{self as js_consumer, pull, PullConsumer},
    stream::ConsumerErrorKind,
    AckKind, ErrorCode,
};
use async_trait::async_trait;
use futures::StreamExt;

use super::{
    AckPolicy, ConsumerDescriptor, ConsumerSpec, DeleteOutcome, DeliverPolicy, InboundMessage,
    MessageBus, PullSource,
};
use crate::error::BusError;

/// JetStream-backed [`MessageBus`].
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    js: jetstream::Context,
}

impl NatsBus {
    /// Connects to `url`, authenticating with a user/password pair when given.
    pub async fn connect(
        url: &str,
        credentials: Option<(String, String)>,
    ) -> Result<Self, BusError> {
        let options = match credentials {
            Some((user, pass)) => async_nats::ConnectOptions::with_user_and_password(user, pass),
            None => async_nats::ConnectOptions::new(),
        };
        let client = options
            .name("relayvisor")
            .connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        let js = jetstream::new(client.clone());
        Ok(Self { client, js })
    }

    async fn stream(&self, name: &str) -> Result<jetstream::stream::Stream, BusError> {
        self.js
            .get_stream(name)
            .await
            .map_err(|e| BusError::StreamNotFound(format!("{name}: {e}")))
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn delete_consumer(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<DeleteOutcome, BusError> {
        let stream = self.stream(stream).await?;
        match stream.delete_consumer(durable).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) => match e.kind() {
                ConsumerErrorKind::JetStream(js_err)
                    if js_err.error_code() == ErrorCode::CONSUMER_NOT_FOUND =>
                {
                    Ok(DeleteOutcome::Absent)
                }
                _ => Err(BusError::Consumer(e.to_string())),
            },
        }
    }

    async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<ConsumerDescriptor, BusError> {
        let stream = self.stream(&spec.stream).await?;
        let consumer = stream
            .create_consumer(pull::Config {
                durable_name: Some(spec.durable.clone()),
                filter_subject: spec.filter_subject.clone(),
                ack_policy: js_consumer::AckPolicy::Explicit,
                deliver_policy: js_consumer::DeliverPolicy::New,
                max_ack_pending: spec.max_ack_pending,
                ack_wait: spec.ack_wait,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;

        let cfg = &consumer.cached_info().config;
        Ok(ConsumerDescriptor {
            stream: spec.stream.clone(),
            durable: cfg.durable_name.clone().unwrap_or_else(|| spec.durable.clone()),
            filter_subject: cfg.filter_subject.clone(),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::New,
            max_ack_pending: cfg.max_ack_pending,
            ack_wait: cfg.ack_wait,
        })
    }

    async fn subscribe(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<Arc<dyn PullSource>, BusError> {
        let consumer: PullConsumer = self
            .stream(stream)
            .await?
            .get_consumer(durable)
            .await
            .map_err(|_| BusError::ConsumerNotFound {
                stream: stream.to_string(),
                durable: durable.to_string(),
            })?;
        Ok(Arc::new(NatsSource { consumer }))
    }

    async fn close(&self) -> Result<(), BusError> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Close(e.to_string()))
    }
}

struct NatsSource {
    consumer: PullConsumer,
}

#[async_trait]
impl PullSource for NatsSource {
    async fn fetch(
        &self,
        batch: usize,
        wait: Duration,
    ) -> Result<Vec<Box<dyn InboundMessage>>, BusError> {
        let mut messages = self
            .consumer
            .batch()
            .max_messages(batch)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;

        let mut out: Vec<Box<dyn InboundMessage>> = Vec::with_capacity(batch);
        while let Some(next) = messages.next().await {
            let message = next.map_err(|e| BusError::Fetch(e.to_string()))?;
            let delivered = message
                .info()
                .map(|info| u64::try_from(info.delivered).unwrap_or(1))
                .unwrap_or(1);
            out.push(Box::new(NatsMessage { message, delivered }));
        }
        Ok(out)
    }
}

struct NatsMessage {
    message: jetstream::Message,
    delivered: u64,
}

#[async_trait]
impl InboundMessage for NatsMessage {
    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivered(&self) -> u64 {
        self.delivered
    }

    async fn ack(&self) -> Result<(), BusError> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }

    async fn term(&self) -> Result<(), BusError> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}
