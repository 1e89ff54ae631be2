//! Domain types shared by the inbound and outbound halves of the pipeline.

use serde::{Deserialize, Serialize};

/// Current wall-clock time as Unix milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ── Conversations ───────────────────────────────────────────────────────────

/// Who currently answers a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Replies are generated and delivered automatically.
    #[default]
    Automated,
    /// A human operator owns the conversation; inbound turns are only recorded.
    Human,
}

impl AssignmentMode {
    #[must_use]
    pub fn is_automated(self) -> bool {
        matches!(self, Self::Automated)
    }
}

/// One correspondent's ongoing exchange on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub correspondent_id: String,
    pub assignment: AssignmentMode,
    pub created_at: i64,
}

impl Conversation {
    #[must_use]
    pub fn new(correspondent_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            correspondent_id: correspondent_id.into(),
            assignment: AssignmentMode::default(),
            created_at: now_ms(),
        }
    }
}

// ── Attachments ─────────────────────────────────────────────────────────────

/// Kind of an inbound attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    File,
    Location,
    Other,
}

impl AttachmentKind {
    /// Parse a platform label. Unknown labels (stickers, reels, ...) map to `Other`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "location" => Self::Location,
            other => MediaKind::from_label(other).map_or(Self::Other, Self::from),
        }
    }
}

impl<'de> Deserialize<'de> for AttachmentKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// Immutable description of something attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl AttachmentDescriptor {
    #[must_use]
    pub fn new(kind: AttachmentKind, url: Option<String>) -> Self {
        Self { kind, url }
    }
}

// ── Outbound parts ──────────────────────────────────────────────────────────

/// Media categories that can be sent as a standalone attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

impl MediaKind {
    /// Wire label used in attachment payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "image" | "photo" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" | "voice" => Some(Self::Audio),
            "file" | "document" => Some(Self::File),
            _ => None,
        }
    }
}

impl From<MediaKind> for AttachmentKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => Self::Image,
            MediaKind::Video => Self::Video,
            MediaKind::Audio => Self::Audio,
            MediaKind::File => Self::File,
        }
    }
}

/// One indivisible unit of an outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { content: String },
    Media { kind: MediaKind, url: String },
}

impl MessagePart {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn media(kind: MediaKind, url: impl Into<String>) -> Self {
        Self::Media {
            kind,
            url: url.into(),
        }
    }

    /// Length counted against the text budget. Media never counts.
    #[must_use]
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text { content } => content.chars().count(),
            Self::Media { .. } => 0,
        }
    }

    /// Content and attachments recorded in history once the part is sent.
    #[must_use]
    pub fn to_history(&self) -> (String, Vec<AttachmentDescriptor>) {
        match self {
            Self::Text { content } => (content.clone(), Vec::new()),
            Self::Media { kind, url } => (String::new(), vec![AttachmentDescriptor::new(
                (*kind).into(),
                Some(url.clone()),
            )]),
        }
    }
}

// ── History ─────────────────────────────────────────────────────────────────

/// Which side of the conversation produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSide {
    Correspondent,
    Agent,
}

/// A persisted history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub conversation_id: String,
    pub side: TurnSide,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentDescriptor>,
    pub timestamp: i64,
}

impl Turn {
    #[must_use]
    pub fn agent_part(conversation_id: &str, part: &MessagePart) -> Self {
        let (content, attachments) = part.to_history();
        Self {
            conversation_id: conversation_id.to_string(),
            side: TurnSide::Agent,
            content,
            attachments,
            timestamp: now_ms(),
        }
    }
}

// ── Inbound ─────────────────────────────────────────────────────────────────

/// One message as received from the channel webhook, before aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Correspondent identifier. Empty when the platform omitted it.
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
    /// Platform timestamp in Unix milliseconds. Required.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl InboundEvent {
    /// Reject events without a sender or a timestamp.
    ///
    /// Blank events are valid: they carry no content but still count as
    /// activity for debouncing.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sender_id.trim().is_empty() {
            return Err(crate::Error::invalid_event("missing sender id"));
        }
        if self.timestamp.is_none() {
            return Err(crate::Error::invalid_event("missing timestamp"));
        }
        Ok(())
    }

    /// Whether the event has text or attachments worth recording.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.text().is_some() || !self.attachments.is_empty()
    }

    /// Trimmed text, `None` when blank.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn message_part_serializes_tagged() {
        let part = MessagePart::media(MediaKind::Image, "https://h/i.png");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "media", "kind": "image", "url": "https://h/i.png"})
        );
    }

    #[test]
    fn unknown_attachment_kind_maps_to_other() {
        let desc: AttachmentDescriptor =
            serde_json::from_str(r#"{"kind": "sticker", "url": "https://h/s"}"#).unwrap();
        assert_eq!(desc.kind, AttachmentKind::Other);
    }

    #[rstest]
    #[case("image", Some(MediaKind::Image))]
    #[case("Document", Some(MediaKind::File))]
    #[case("voice", Some(MediaKind::Audio))]
    #[case("location", None)]
    fn media_kind_labels(#[case] label: &str, #[case] expected: Option<MediaKind>) {
        assert_eq!(MediaKind::from_label(label), expected);
    }

    #[test]
    fn media_does_not_count_against_budget() {
        assert_eq!(MessagePart::media(MediaKind::File, "https://h/a.pdf").text_len(), 0);
        assert_eq!(MessagePart::text("héllo").text_len(), 5);
    }

    #[test]
    fn media_history_keeps_url_as_attachment() {
        let turn = Turn::agent_part("c1", &MessagePart::media(MediaKind::Video, "https://h/v.mp4"));
        assert_eq!(turn.side, TurnSide::Agent);
        assert!(turn.content.is_empty());
        assert_eq!(turn.attachments[0].kind, AttachmentKind::Video);
    }

    #[test]
    fn new_conversation_is_automated() {
        let convo = Conversation::new("psid-1");
        assert!(convo.assignment.is_automated());
        assert_eq!(convo.correspondent_id, "psid-1");
    }

    #[test]
    fn inbound_event_validation() {
        let event: InboundEvent = serde_json::from_str(
            r#"{"sender_id": "psid-1", "text": "  hi  ", "timestamp": 1700000000000}"#,
        )
        .unwrap();
        event.validate().unwrap();
        assert_eq!(event.text(), Some("hi"));
        assert!(event.has_content());

        let undated: InboundEvent =
            serde_json::from_str(r#"{"sender_id": "psid-1", "text": "hi"}"#).unwrap();
        assert!(matches!(
            undated.validate(),
            Err(crate::Error::InvalidEvent { .. })
        ));

        let blank: InboundEvent =
            serde_json::from_str(r#"{"sender_id": "psid-1", "text": "   ", "timestamp": 1}"#)
                .unwrap();
        blank.validate().unwrap();
        assert!(!blank.has_content());

        let photo: InboundEvent = serde_json::from_str(
            r#"{"sender_id": "psid-1", "timestamp": 1, "attachments": [{"kind": "image", "url": "https://h/p.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(photo.text(), None);
        assert!(photo.has_content());
    }
}
