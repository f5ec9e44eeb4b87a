//! # Runtime and process configuration.
//!
//! Two layers:
//! 1. [`Config`] runtime knobs for the supervisor, channel actors and consumers.
//!    Every field has a production default (`Config::default()`).
//! 2. [`Settings`] what the process reads from its environment at startup:
//!    bus URL and credentials, sink token, one destination per channel, and
//!    optional overrides for [`Config`].
//!
//! ## Environment
//! | variable                  | required | meaning                              |
//! |---------------------------|----------|--------------------------------------|
//! | `NATS_URL`                | yes      | bus server URL                       |
//! | `NATS_USER` / `NATS_PASS` | no       | user/password pair                   |
//! | `BOT_TOKEN`               | yes      | Telegram bot token                   |
//! | `CHAT_ID_ALERTS`          | yes      | destination of the alerts channel    |
//! | `CHAT_ID_ENGINE`          | yes      | destination of the engine channel    |
//! | `IS_DEV`                  | no       | verbose console logging              |
//! | `RELAY_BATCH_SIZE`        | no       | [`Config::batch_size`]               |
//! | `RELAY_FETCH_WAIT_MS`     | no       | [`Config::fetch_wait`]               |
//! | `RELAY_MAX_ACK_PENDING`   | no       | [`Config::max_ack_pending`]          |
//! | `RELAY_ACK_WAIT_SECS`     | no       | [`Config::ack_wait`]                 |
//! | `RELAY_ACK_MODE`          | no       | `after` / `before`                   |
//! | `RELAY_DEAD_LETTER_AFTER` | no       | [`Config::dead_letter_after`]        |
//! | `RELAY_TELEGRAM_API`      | no       | sink base URL                        |

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::{AckMode, BackoffPolicy};

/// Runtime configuration shared by the supervisor and every channel.
///
/// ## Sentinel values
/// - `dead_letter_after = None` → messages are redelivered forever
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for channel actors to stop after a shutdown signal.
    pub grace: Duration,

    /// Capacity of the runtime event bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Maximum messages pulled per fetch iteration.
    pub batch_size: usize,

    /// How long one pull waits for messages before returning empty.
    pub fetch_wait: Duration,

    /// Server-side ceiling on delivered-but-unacknowledged messages per consumer.
    pub max_ack_pending: i64,

    /// How long the server waits for an ack before redelivering.
    pub ack_wait: Duration,

    /// Pause schedule after a failed iteration.
    pub backoff: BackoffPolicy,

    /// Ordering of acknowledgment relative to sink delivery.
    pub ack_mode: AckMode,

    /// Terminate a message without dispatch once its delivery count exceeds this.
    pub dead_letter_after: Option<u32>,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a batch size clamped to a minimum of 1.
    #[inline]
    pub fn batch_size_clamped(&self) -> usize {
        self.batch_size.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 10s`
    /// - `bus_capacity = 1024`
    /// - `batch_size = 100`, `fetch_wait = 1s`
    /// - `max_ack_pending = 5000`, `ack_wait = 30s`
    /// - `backoff = fixed 50ms`
    /// - `ack_mode = AfterSend`, `dead_letter_after = None`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            bus_capacity: 1024,
            batch_size: 100,
            fetch_wait: Duration::from_secs(1),
            max_ack_pending: 5000,
            ack_wait: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            ack_mode: AckMode::AfterSend,
            dead_letter_after: None,
        }
    }
}

/// Default Telegram Bot API base URL.
pub const TELEGRAM_API: &str = "https://api.telegram.org";

/// Process settings loaded once at startup.
#[derive(Clone)]
pub struct Settings {
    /// Bus server URL.
    pub nats_url: String,
    /// Optional user/password pair.
    pub nats_credentials: Option<(String, String)>,
    /// Sink bot token.
    pub bot_token: String,
    /// Sink base URL.
    pub telegram_api: String,
    /// Destination of the alerts channel.
    pub chat_id_alerts: String,
    /// Destination of the engine channel.
    pub chat_id_engine: String,
    /// Verbose console logging.
    pub is_dev: bool,
    /// Runtime knobs after environment overrides.
    pub runtime: Config,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("nats_url", &self.nats_url)
            .field("nats_user", &self.nats_credentials.as_ref().map(|(u, _)| u))
            .field("bot_token", &"<redacted>")
            .field("telegram_api", &self.telegram_api)
            .field("chat_id_alerts", &self.chat_id_alerts)
            .field("chat_id_engine", &self.chat_id_engine)
            .field("is_dev", &self.is_dev)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing { key });

        let nats_credentials = match (get("NATS_USER"), get("NATS_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing { key: "NATS_PASS" }),
            (None, Some(_)) => return Err(ConfigError::Missing { key: "NATS_USER" }),
        };

        let mut runtime = Config::default();
        if let Some(n) = parse_opt::<usize>(&get, "RELAY_BATCH_SIZE")? {
            runtime.batch_size = n;
        }
        if let Some(ms) = parse_opt::<u64>(&get, "RELAY_FETCH_WAIT_MS")? {
            runtime.fetch_wait = Duration::from_millis(ms);
        }
        if let Some(n) = parse_opt::<i64>(&get, "RELAY_MAX_ACK_PENDING")? {
            runtime.max_ack_pending = n;
        }
        if let Some(secs) = parse_opt::<u64>(&get, "RELAY_ACK_WAIT_SECS")? {
            runtime.ack_wait = Duration::from_secs(secs);
        }
        if let Some(raw) = get("RELAY_ACK_MODE") {
            runtime.ack_mode = AckMode::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "RELAY_ACK_MODE",
                value: raw.clone(),
                reason: "expected `after` or `before`".into(),
            })?;
        }
        runtime.dead_letter_after = parse_opt::<u32>(&get, "RELAY_DEAD_LETTER_AFTER")?;

        Ok(Self {
            nats_url: required("NATS_URL")?,
            nats_credentials,
            bot_token: required("BOT_TOKEN")?,
            telegram_api: get("RELAY_TELEGRAM_API").unwrap_or_else(|| TELEGRAM_API.to_string()),
            chat_id_alerts: required("CHAT_ID_ALERTS")?,
            chat_id_engine: required("CHAT_ID_ENGINE")?,
            is_dev: get("IS_DEV").is_some_and(|v| is_truthy(&v)),
            runtime,
        })
    }
}

fn parse_opt<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn is_truthy(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("NATS_URL", "nats://localhost:4222"),
        ("BOT_TOKEN", "123:abc"),
        ("CHAT_ID_ALERTS", "-1001"),
        ("CHAT_ID_ENGINE", "-1002"),
    ];

    #[test]
    fn minimal_environment_uses_defaults() {
        let s = Settings::from_lookup(env(BASE)).expect("settings");
        assert_eq!(s.nats_url, "nats://localhost:4222");
        assert!(s.nats_credentials.is_none());
        assert_eq!(s.telegram_api, TELEGRAM_API);
        assert!(!s.is_dev);
        assert_eq!(s.runtime.batch_size, 100);
        assert_eq!(s.runtime.max_ack_pending, 5000);
        assert_eq!(s.runtime.fetch_wait, Duration::from_secs(1));
        assert_eq!(s.runtime.dead_letter_after, None);
    }

    #[test]
    fn missing_destination_is_reported_by_name() {
        let pairs: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "CHAT_ID_ENGINE")
            .collect();
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "CHAT_ID_ENGINE" }));
    }

    #[test]
    fn half_credentials_are_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("NATS_USER", "relay"));
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "NATS_PASS" }));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("NATS_USER", "relay"),
            ("NATS_PASS", "secret"),
            ("IS_DEV", "true"),
            ("RELAY_BATCH_SIZE", "10"),
            ("RELAY_FETCH_WAIT_MS", "250"),
            ("RELAY_ACK_MODE", "before"),
            ("RELAY_DEAD_LETTER_AFTER", "5"),
        ]);
        let s = Settings::from_lookup(env(&pairs)).expect("settings");
        assert_eq!(
            s.nats_credentials,
            Some(("relay".to_string(), "secret".to_string()))
        );
        assert!(s.is_dev);
        assert_eq!(s.runtime.batch_size, 10);
        assert_eq!(s.runtime.fetch_wait, Duration::from_millis(250));
        assert_eq!(s.runtime.ack_mode, AckMode::BeforeSend);
        assert_eq!(s.runtime.dead_letter_after, Some(5));
    }

    #[test]
    fn garbage_number_is_invalid() {
        let mut pairs = BASE.to_vec();
        pairs.push(("RELAY_BATCH_SIZE", "lots"));
        let err = Settings::from_lookup(env(&pairs)).unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut pairs = BASE.to_vec();
        pairs.extend([("NATS_USER", "relay"), ("NATS_PASS", "hunter2")]);
        let s = Settings::from_lookup(env(&pairs)).expect("settings");
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("123:abc"));
    }
}
