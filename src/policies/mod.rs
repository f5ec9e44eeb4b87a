//! Delivery and retry policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long a channel pauses after a failed iteration
//! - [`JitterPolicy`]  randomization of that pause
//! - [`AckMode`]       whether a message is acknowledged after or before the sink call
//!
//! ## Quick wiring
//! ```text
//! Config { backoff, ack_mode, dead_letter_after, .. }
//!      └─► core::actor::ChannelActor uses:
//!           - backoff.next(consecutive_failures) after each failed iteration
//!      └─► core::runner::run_once uses:
//!           - ack_mode to order dispatch and acknowledgment
//! ```

mod ack;
mod backoff;
mod jitter;

pub use ack::AckMode;
pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
