//! Runtime core: channel loops and their orchestration.
//!
//! Public API from this module is [`Supervisor`] (with its builder) and the
//! [`LifecycleTracker`] it maintains.
//!
//! Internal modules:
//! - [`runner`]: one fetch/dispatch/ack iteration;
//! - [`actor`]: repeats iterations with backoff between failures;
//! - [`supervisor`]: provisions channels, spawns actors, handles shutdown;
//! - [`lifecycle`]: sequence-ordered channel state tracking;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod actor;
mod builder;
mod lifecycle;
mod runner;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use lifecycle::{ChannelState, LifecycleTracker};
pub use supervisor::Supervisor;
