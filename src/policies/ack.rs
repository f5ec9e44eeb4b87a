//! # Acknowledgment ordering.
//!
//! [`AckMode`] makes the ack/dispatch ordering an explicit choice instead of an
//! accident of statement order.
//!
//! ```text
//! AfterSend  (default):  receive ─► dispatch ─► ack        at-least-once
//!                                      └─ Err ─► no ack    redelivered after ack wait
//!
//! BeforeSend:            receive ─► ack ─► dispatch        at-most-once, best effort
//!                                            └─ Err ─► lost
//! ```

/// When a message is acknowledged relative to its sink delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge only after the sink accepted the notification.
    #[default]
    AfterSend,
    /// Acknowledge on receipt, then deliver best-effort.
    BeforeSend,
}

impl AckMode {
    /// Parses `after` / `before` (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "after" | "after_send" | "after-send" => Some(AckMode::AfterSend),
            "before" | "before_send" | "before-send" => Some(AckMode::BeforeSend),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_spellings() {
        assert_eq!(AckMode::parse("After"), Some(AckMode::AfterSend));
        assert_eq!(AckMode::parse("before-send"), Some(AckMode::BeforeSend));
        assert_eq!(AckMode::parse("sometimes"), None);
        assert_eq!(AckMode::default(), AckMode::AfterSend);
    }
}
