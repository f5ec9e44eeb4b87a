//! # Event subscribers.
//!
//! Subscribers observe runtime events broadcast through the [`Bus`](crate::events::Bus).
//! They are the only place where the relay produces log output: channel actors,
//! the provisioner and the supervisor publish events, and [`LogWriter`] turns
//! them into `tracing` records.
//!
//! ```text
//! ChannelActor ── publish(Event) ──► Bus ──► supervisor listener ──► SubscriberSet::emit
//!                                                                      ├──► LogWriter
//!                                                                      └──► custom ...
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
