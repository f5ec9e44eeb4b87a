//! # Supervisor: provisions channels, runs their actors, drives graceful shutdown.
//!
//! The [`Supervisor`] owns the runtime event bus, the subscriber list and the
//! [`LifecycleTracker`]. It is the single place where message-bus resources are
//! acquired and released.
//!
//! ## High-level architecture
//! ```text
//! run_until(channels, shutdown):
//!
//!   subscriber_listener(): Bus.subscribe() ─► LifecycleTracker::update + SubscriberSet::emit
//!
//!   Provisioning (sequential, fatal on error):
//!     for channel:
//!       Provisioner::ensure(channel.consumer_spec(cfg))   ─► RuntimeError::Provision
//!       MessageBus::subscribe(stream, durable)            ─► RuntimeError::Subscribe
//!
//!   Spawn actors:
//!     ChannelActor::new(channel, source, dispatcher, params)   (one per channel)
//!       └──► child CancellationToken = runtime_token.child_token()
//!            set.spawn(actor.run(child_token))
//!
//!   Shutdown path:
//!     shutdown future completes
//!       └─► Bus.publish(ShutdownRequested)
//!       └─► runtime_token.cancel()     actors finish the in-flight message, then exit
//!       └─► wait_all_with_grace(cfg.grace):
//!              ├─ all joined      → AllStoppedWithin
//!              └─ timeout         → GraceExceeded (stuck = LifecycleTracker::running())
//!
//!   Teardown (always):
//!     MessageBus::close()    flush pending acks, drain the connection
//!     listener drained       every published event reaches the subscribers
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::bus::{MessageBus, PullSource};
use crate::channel::ChannelDefinition;
use crate::config::Config;
use crate::core::actor::{ChannelActor, ChannelActorParams};
use crate::core::builder::SupervisorBuilder;
use crate::core::lifecycle::LifecycleTracker;
use crate::core::shutdown;
use crate::dispatch::{Dispatcher, Sink};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::provision::Provisioner;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Coordinates channel actors, event delivery and graceful shutdown.
pub struct Supervisor {
    cfg: Config,
    bus: Arc<dyn MessageBus>,
    dispatcher: Dispatcher,
    events: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    lifecycle: Arc<LifecycleTracker>,
}

impl Supervisor {
    /// Returns a builder over the message bus and notification sink.
    pub fn builder(
        cfg: Config,
        bus: Arc<dyn MessageBus>,
        sink: Arc<dyn Sink>,
    ) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, bus, sink)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Arc<dyn MessageBus>,
        dispatcher: Dispatcher,
        events: Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        Self {
            cfg,
            bus,
            dispatcher,
            events,
            subscribers,
            lifecycle: Arc::new(LifecycleTracker::new()),
        }
    }

    /// Runtime event bus; subscribe before `run` to observe startup events.
    pub fn events(&self) -> &Bus {
        &self.events
    }

    /// Channel lifecycle states.
    pub fn lifecycle(&self) -> Arc<LifecycleTracker> {
        Arc::clone(&self.lifecycle)
    }

    /// Runs `channels` until a termination signal arrives.
    pub async fn run(&self, channels: Vec<ChannelDefinition>) -> Result<(), RuntimeError> {
        self.run_until(channels, shutdown::shutdown_signal()).await
    }

    /// Runs `channels` until `shutdown` completes.
    ///
    /// Returns `Err` when provisioning fails (no channel is started) or when
    /// actors outlive the grace period. The message bus is closed in every case.
    pub async fn run_until<F>(
        &self,
        channels: Vec<ChannelDefinition>,
        shutdown: F,
    ) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let listener_stop = CancellationToken::new();
        let listener = self.subscriber_listener(listener_stop.clone());

        let res = match self.provision_all(channels).await {
            Ok(bound) => {
                let token = CancellationToken::new();
                let mut set = JoinSet::new();
                self.spawn_channel_actors(&mut set, &token, bound);
                self.drive_shutdown(&mut set, &token, shutdown).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.bus.close().await {
            tracing::warn!(error = %e, "closing message bus failed");
        }
        listener_stop.cancel();
        let _ = listener.await;
        res
    }

    /// Forwards bus events to the lifecycle tracker and subscribers until stopped,
    /// then drains what is left and waits for subscriber queues to empty.
    fn subscriber_listener(&self, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let set = SubscriberSet::new(self.subscribers.clone(), self.events.clone());
        let lifecycle = Arc::clone(&self.lifecycle);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => {
                            lifecycle.update(&ev).await;
                            set.emit(&ev);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => {
                        lifecycle.update(&ev).await;
                        set.emit(&ev);
                    }
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            set.shutdown().await;
        })
    }

    /// Provisions and binds every channel; the first failure aborts startup.
    async fn provision_all(
        &self,
        channels: Vec<ChannelDefinition>,
    ) -> Result<Vec<(Arc<ChannelDefinition>, Arc<dyn PullSource>)>, RuntimeError> {
        for ch in &channels {
            self.lifecycle.register(ch.label()).await;
        }

        let provisioner = Provisioner::new(Arc::clone(&self.bus), self.events.clone());
        let mut bound = Vec::with_capacity(channels.len());
        for ch in channels {
            provisioner
                .ensure(ch.label(), &ch.consumer_spec(&self.cfg))
                .await?;
            let source = self
                .bus
                .subscribe(ch.stream(), ch.durable())
                .await
                .map_err(|source| RuntimeError::Subscribe {
                    channel: ch.label().to_string(),
                    source,
                })?;
            bound.push((Arc::new(ch), source));
        }
        Ok(bound)
    }

    fn spawn_channel_actors(
        &self,
        set: &mut JoinSet<()>,
        runtime_token: &CancellationToken,
        bound: Vec<(Arc<ChannelDefinition>, Arc<dyn PullSource>)>,
    ) {
        let params = ChannelActorParams::from(&self.cfg);
        for (channel, source) in bound {
            let actor = ChannelActor::new(
                self.events.clone(),
                channel,
                source,
                self.dispatcher.clone(),
                params.clone(),
            );
            set.spawn(actor.run(runtime_token.child_token()));
        }
    }

    /// Waits until either all actors finish or `shutdown` completes.
    async fn drive_shutdown<F>(
        &self,
        set: &mut JoinSet<()>,
        runtime_token: &CancellationToken,
        shutdown: F,
    ) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                self.events.publish(Event::new(EventKind::ShutdownRequested));
                runtime_token.cancel();
                self.wait_all_with_grace(set).await
            }
            _ = async { while set.join_next().await.is_some() {} } => {
                Ok(())
            }
        }
    }

    /// Waits for all actors within [`Config::grace`].
    async fn wait_all_with_grace(&self, set: &mut JoinSet<()>) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let done = async { while set.join_next().await.is_some() {} };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => {
                self.events.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.events.publish(Event::new(EventKind::GraceExceeded));
                let stuck = self.lifecycle.running().await;
                set.abort_all();
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}
