use {
    async_trait::async_trait,
    courier_common::types::{AssignmentMode, MediaKind, MessagePart},
};

use crate::Result;

// ── Channel events (pub/sub) ────────────────────────────────────────────────

/// Events emitted by the pipeline for real-time observer updates.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    InboundMessage {
        conversation_id: String,
        correspondent_id: String,
        text: Option<String>,
        attachment_count: usize,
    },
    /// One part of a reply reached the channel and was persisted.
    OutboundPart {
        conversation_id: String,
        part_index: usize,
        part: MessagePart,
    },
    /// A delivery plan finished (fully or partially).
    DeliveryFinished {
        conversation_id: String,
        total: usize,
        sent: usize,
        failed: usize,
    },
    AssignmentChanged {
        conversation_id: String,
        mode: AssignmentMode,
    },
}

/// Sink for channel events. Implementations must not block the caller.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    /// Broadcast a channel event to observers, best effort.
    async fn emit(&self, event: ChannelEvent);
}

/// Sink that drops every event.
pub struct NoopEventSink;

#[async_trait]
impl ChannelEventSink for NoopEventSink {
    async fn emit(&self, _event: ChannelEvent) {}
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// Presence indicator shown to the correspondent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Idle,
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    async fn send_media(&self, to: &str, kind: MediaKind, url: &str) -> Result<()>;

    /// Announce a presence change. No-op by default.
    async fn send_presence(&self, _to: &str, _presence: Presence) -> Result<()> {
        Ok(())
    }

    /// Send one part of a delivery plan.
    async fn send_part(&self, to: &str, part: &MessagePart) -> Result<()> {
        match part {
            MessagePart::Text { content } => self.send_text(to, content).await,
            MessagePart::Media { kind, url } => self.send_media(to, *kind, url).await,
        }
    }
}
