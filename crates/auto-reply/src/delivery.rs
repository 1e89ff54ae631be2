//! Paced, retrying delivery of a plan to one correspondent.

use std::{sync::Arc, time::Duration};

use {
    courier_channels::{ChannelEvent, ChannelEventSink, ChannelOutbound, HistoryStore, Presence},
    courier_common::types::{Conversation, MessagePart, Turn},
    courier_config::DeliveryConfig,
    serde::Serialize,
    tracing::{debug, info, warn},
};

use crate::{
    chunk::DeliveryPlan,
    presence::{self, PresenceSignaler},
};

/// Retry, pacing and presence knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub presence_interval: Duration,
    pub min_part_delay: Duration,
    pub chars_per_second: f64,
}

impl From<&DeliveryConfig> for DeliverySettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            presence_interval: config.presence_interval(),
            min_part_delay: config.min_part_delay(),
            chars_per_second: config.chars_per_second,
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

// ── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Every part was sent (trivially true for an empty plan).
    Complete,
    /// Some parts were sent, some were not.
    Partial,
    /// Nothing was sent.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartFailure {
    pub index: usize,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub conversation_id: String,
    pub total: usize,
    pub sent: usize,
    pub failures: Vec<PartFailure>,
}

impl DeliveryReport {
    fn new(conversation_id: &str, total: usize) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            total,
            sent: 0,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn outcome(&self) -> DeliveryOutcome {
        match (self.sent, self.failures.len()) {
            (_, 0) => DeliveryOutcome::Complete,
            (0, _) => DeliveryOutcome::Failed,
            _ => DeliveryOutcome::Partial,
        }
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────────────

/// Sends plans part by part: presence first, then each part with pacing in
/// between, retrying transient failures with capped exponential backoff.
pub struct Dispatcher {
    outbound: Arc<dyn ChannelOutbound>,
    history: Arc<dyn HistoryStore>,
    events: Arc<dyn ChannelEventSink>,
    settings: DeliverySettings,
}

impl Dispatcher {
    pub fn new(
        outbound: Arc<dyn ChannelOutbound>,
        history: Arc<dyn HistoryStore>,
        events: Arc<dyn ChannelEventSink>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            outbound,
            history,
            events,
            settings,
        }
    }

    /// Deliver `plan` to the conversation's correspondent.
    ///
    /// A part that still fails after its retry budget is recorded in the
    /// report and skipped; later parts are still attempted. Only parts that
    /// reached the channel are written to history.
    pub async fn deliver(&self, conversation: &Conversation, plan: &DeliveryPlan) -> DeliveryReport {
        let mut report = DeliveryReport::new(&conversation.id, plan.len());
        if plan.is_empty() {
            debug!(conversation_id = %conversation.id, "empty delivery plan, nothing to send");
            return report;
        }

        let to = conversation.correspondent_id.as_str();
        let signaler = PresenceSignaler::start(
            Arc::clone(&self.outbound),
            to.to_string(),
            self.settings.presence_interval,
        )
        .await;
        presence::announce(self.outbound.as_ref(), to, Presence::Idle).await;

        for (index, part) in plan.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.pacing_delay(part)).await;
            }

            match self.send_with_retry(to, part).await {
                Ok(attempts) => {
                    report.sent += 1;
                    debug!(
                        conversation_id = %conversation.id,
                        part_index = index,
                        attempts,
                        "part delivered"
                    );
                    self.record(conversation, index, part).await;
                },
                Err((attempts, error)) => {
                    warn!(
                        conversation_id = %conversation.id,
                        part_index = index,
                        attempts,
                        error = %error,
                        "giving up on part"
                    );
                    report.failures.push(PartFailure {
                        index,
                        attempts,
                        error: error.to_string(),
                    });
                },
            }
        }

        signaler.stop().await;

        info!(
            conversation_id = %conversation.id,
            total = report.total,
            sent = report.sent,
            failed = report.failures.len(),
            outcome = ?report.outcome(),
            "delivery finished"
        );
        self.events
            .emit(ChannelEvent::DeliveryFinished {
                conversation_id: conversation.id.clone(),
                total: report.total,
                sent: report.sent,
                failed: report.failures.len(),
            })
            .await;
        report
    }

    /// Wait before retry number `attempt` (1-based):
    /// `min(initial * 2^(attempt-1), max)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(20);
        self.settings
            .initial_backoff
            .saturating_mul(factor)
            .min(self.settings.max_backoff)
    }

    /// Pause before sending `part`: `max(min_delay, chars / rate)`.
    #[must_use]
    pub fn pacing_delay(&self, part: &MessagePart) -> Duration {
        let rate = self.settings.chars_per_second;
        let reading = if rate.is_finite() && rate > 0.0 {
            Duration::try_from_secs_f64(part.text_len() as f64 / rate).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        reading.max(self.settings.min_part_delay)
    }

    /// Returns the number of attempts used, or the attempts and last error.
    async fn send_with_retry(
        &self,
        to: &str,
        part: &MessagePart,
    ) -> Result<u32, (u32, courier_channels::Error)> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.outbound.send_part(to, part).await {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let wait = self.backoff_delay(attempt);
                    warn!(
                        to,
                        attempt,
                        max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %err,
                        "send failed, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
                Err(err) => return Err((attempt, err)),
            }
        }
    }

    async fn record(&self, conversation: &Conversation, index: usize, part: &MessagePart) {
        if let Err(e) = self
            .history
            .append(Turn::agent_part(&conversation.id, part))
            .await
        {
            warn!(
                conversation_id = %conversation.id,
                part_index = index,
                "failed to record delivered part: {e}"
            );
        }
        self.events
            .emit(ChannelEvent::OutboundPart {
                conversation_id: conversation.id.clone(),
                part_index: index,
                part: part.clone(),
            })
            .await;
    }
}
