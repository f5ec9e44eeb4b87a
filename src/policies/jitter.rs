//! # Jitter policy for backoff delays.
//!
//! With two channels sharing one bus connection, a connection drop fails both
//! actors at the same instant. Jitter spreads their retries apart.
//!
//! - [`JitterPolicy::None`]: exact delay (relay default)
//! - [`JitterPolicy::Full`]: random in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`]: random in `[base, prev × 3]`, capped at max

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the delay as computed.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Half fixed, half uniform.
    Equal,
    /// Uniform in `[base, prev × 3]`; needs [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`. `Decorrelated` returns `delay` unchanged.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => uniform_ms(0, millis(delay)),
            JitterPolicy::Equal => {
                let half = millis(delay) / 2;
                Duration::from_millis(half) + uniform_ms(0, half)
            }
        }
    }

    /// Decorrelated jitter with its context; other policies fall back to `apply(prev)`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }
        let lo = millis(base);
        let hi = millis(prev).saturating_mul(3).min(millis(max)).max(lo);
        if lo >= hi {
            return base;
        }
        uniform_ms(lo, hi)
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

fn uniform_ms(lo: u64, hi: u64) -> Duration {
    if hi <= lo {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(50);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_fallback_for_other_policies() {
        let prev = Duration::from_millis(70);
        let out = JitterPolicy::None.apply_decorrelated(Duration::from_millis(10), prev, Duration::from_secs(1));
        assert_eq!(out, prev);
    }
}
