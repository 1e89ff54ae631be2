use {
    courier_common::types::InboundEvent,
    serde::Deserialize,
};

/// Webhook body: one event, or a batch under `events`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookBody {
    Batch { events: Vec<InboundEvent> },
    Single(InboundEvent),
}

/// Parse a webhook body into the events it carries, in delivery order.
pub fn parse_webhook(body: &[u8]) -> serde_json::Result<Vec<InboundEvent>> {
    Ok(match serde_json::from_slice(body)? {
        WebhookBody::Batch { events } => events,
        WebhookBody::Single(event) => vec![event],
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, courier_common::types::AttachmentKind};

    #[test]
    fn single_event() {
        let events = parse_webhook(
            br#"{"sender_id": "psid-1", "text": "hi", "attachments": [{"kind": "image", "url": "https://h/p.jpg"}], "timestamp": 1700000000000}"#,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sender_id, "psid-1");
        assert_eq!(events[0].attachments[0].kind, AttachmentKind::Image);
        assert_eq!(events[0].timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn batch_keeps_order() {
        let events = parse_webhook(
            br#"{"events": [
                {"sender_id": "a", "text": "one", "timestamp": 1},
                {"sender_id": "b", "text": "two", "timestamp": 2}
            ]}"#,
        )
        .unwrap();
        let senders: Vec<_> = events.iter().map(|e| e.sender_id.as_str()).collect();
        assert_eq!(senders, ["a", "b"]);
    }

    #[test]
    fn unknown_attachment_kind_is_other() {
        let events = parse_webhook(
            br#"{"sender_id": "a", "timestamp": 1, "attachments": [{"kind": "sticker"}]}"#,
        )
        .unwrap();
        assert_eq!(events[0].attachments[0].kind, AttachmentKind::Other);
        assert!(events[0].attachments[0].url.is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_webhook(b"not json").is_err());
        assert!(parse_webhook(b"42").is_err());
    }

    #[test]
    fn missing_sender_parses_but_fails_validation() {
        let events = parse_webhook(br#"{"text": "who am I", "timestamp": 1}"#).unwrap();
        assert!(events[0].validate().is_err());
    }
}
