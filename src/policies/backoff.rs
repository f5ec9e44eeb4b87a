//! # Backoff policy between failed fetch iterations.
//!
//! [`BackoffPolicy`] decides how long a channel actor sleeps after an iteration
//! fails before pulling again. The relay default is a **fixed 50 ms** pause:
//! short enough that a transient blip costs almost nothing, long enough that a
//! permanently failing sink or a poison message does not spin a core.
//!
//! The delay for consecutive failure `n` (0-indexed) is `first × factor^n`,
//! clamped to `max`, then jittered. The base is derived from `n` alone, so jitter
//! output never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use relayvisor::{BackoffPolicy, JitterPolicy};
//!
//! let fixed = BackoffPolicy::default();
//! assert_eq!(fixed.next(0), Duration::from_millis(50));
//! assert_eq!(fixed.next(7), Duration::from_millis(50));
//!
//! let growing = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(growing.next(2), Duration::from_millis(200));
//! assert_eq!(growing.next(10), Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay schedule applied after failed iterations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure in a row.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per consecutive failure (`1.0` = fixed).
    pub factor: f64,
    /// Randomization applied to the clamped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Fixed 50 ms, no jitter.
    fn default() -> Self {
        Self::fixed(Duration::from_millis(50))
    }
}

impl BackoffPolicy {
    /// A constant delay with no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay after `failures` consecutive failures (0-indexed).
    pub fn next(&self, failures: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
