//! Config schema types (server, aggregation, delivery, channel, reply).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Apology sent when reply generation fails outright.
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, something went wrong on our side. Please try again in a moment.";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    pub delivery: DeliveryConfig,
    pub channel: ChannelConfig,
    pub reply: ReplyConfig,
}

/// Webhook server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 8080.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Inbound debounce settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Inbound silence (seconds) that flushes a conversation's pending fragments.
    pub quiet_period_secs: f64,
}

impl AggregationConfig {
    #[must_use]
    pub fn quiet_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.quiet_period_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            quiet_period_secs: 3.0,
        }
    }
}

/// Outbound shaping, pacing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum characters per text part.
    pub char_limit: usize,
    /// Send attempts per part, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles on each further attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single backoff wait.
    pub max_backoff_ms: u64,
    /// How often the "composing" indicator is re-announced.
    pub presence_interval_secs: u64,
    /// Minimum pause between two consecutive parts.
    pub min_part_delay_ms: u64,
    /// Simulated typing speed used to pace long parts.
    pub chars_per_second: f64,
    /// Sent instead of a reply when generation fails.
    pub fallback_reply: String,
    /// Translate authoring markdown into channel display markup.
    pub translate_markup: bool,
}

impl DeliveryConfig {
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs.max(1))
    }

    #[must_use]
    pub fn min_part_delay(&self) -> Duration {
        Duration::from_millis(self.min_part_delay_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            char_limit: 2000,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            presence_interval_secs: 8,
            min_part_delay_ms: 1_000,
            chars_per_second: 40.0,
            fallback_reply: DEFAULT_FALLBACK_REPLY.into(),
            translate_markup: true,
        }
    }
}

/// Outbound Send API account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Base URL of the Send API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Bearer credential.
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    /// Fixed sender (page/business) identifier.
    pub sender_id: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("sender_id", &self.sender_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: Secret::new(String::new()),
            sender_id: String::new(),
            request_timeout_secs: 15,
        }
    }
}

/// Reply-generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// HTTP endpoint receiving coalesced turns. Unset means echo replies.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 60,
        }
    }
}
