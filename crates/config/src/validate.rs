//! Semantic validation of a loaded configuration.
//!
//! Parsing already rejects type errors; this pass reports values that parse
//! fine but would make the pipeline misbehave (zero budgets, runaway quiet
//! periods, a channel with nowhere to send).

use crate::schema::CourierConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "delivery.char_limit"
    pub path: &'static str,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

const QUIET_PERIOD_RANGE: std::ops::RangeInclusive<f64> = 0.1..=60.0;

/// Validate a configuration and collect diagnostics.
#[must_use]
pub fn validate(config: &CourierConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    let quiet = config.aggregation.quiet_period_secs;
    if !quiet.is_finite() || !QUIET_PERIOD_RANGE.contains(&quiet) {
        result.push(
            Severity::Error,
            "aggregation.quiet_period_secs",
            format!("must be between 0.1 and 60 seconds, got {quiet}"),
        );
    }

    let delivery = &config.delivery;
    if delivery.char_limit == 0 {
        result.push(Severity::Error, "delivery.char_limit", "must be at least 1");
    }
    if delivery.max_attempts == 0 {
        result.push(Severity::Error, "delivery.max_attempts", "must be at least 1");
    }
    if delivery.initial_backoff_ms > delivery.max_backoff_ms {
        result.push(
            Severity::Warning,
            "delivery.initial_backoff_ms",
            "exceeds max_backoff_ms; every retry will wait max_backoff_ms",
        );
    }
    if !delivery.chars_per_second.is_finite() || delivery.chars_per_second <= 0.0 {
        result.push(
            Severity::Error,
            "delivery.chars_per_second",
            "must be a positive number",
        );
    }
    if delivery.fallback_reply.trim().is_empty() {
        result.push(
            Severity::Warning,
            "delivery.fallback_reply",
            "empty fallback means failed generations send nothing",
        );
    }

    if config.channel.base_url.trim().is_empty() {
        result.push(
            Severity::Error,
            "channel.base_url",
            "no Send API base URL configured",
        );
    } else if !config.channel.base_url.starts_with("http://")
        && !config.channel.base_url.starts_with("https://")
    {
        result.push(
            Severity::Error,
            "channel.base_url",
            "must start with http:// or https://",
        );
    }
    if config.channel.sender_id.trim().is_empty() {
        result.push(
            Severity::Warning,
            "channel.sender_id",
            "no sender id configured",
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use {super::*, crate::schema::ChannelConfig};

    fn valid_config() -> CourierConfig {
        CourierConfig {
            channel: ChannelConfig {
                base_url: "https://api.example.com".into(),
                sender_id: "page-1".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = validate(&valid_config());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn default_config_reports_missing_channel() {
        let result = validate(&CourierConfig::default());
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "channel.base_url")
        );
    }

    #[test]
    fn zero_budgets_are_errors() {
        let mut cfg = valid_config();
        cfg.delivery.char_limit = 0;
        cfg.delivery.max_attempts = 0;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 2);
    }

    #[test]
    fn quiet_period_out_of_range() {
        let mut cfg = valid_config();
        cfg.aggregation.quiet_period_secs = 120.0;
        assert!(validate(&cfg).has_errors());
        cfg.aggregation.quiet_period_secs = f64::NAN;
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn inverted_backoff_is_warning() {
        let mut cfg = valid_config();
        cfg.delivery.initial_backoff_ms = 10_000;
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }
}
