use std::sync::Arc;

use {
    async_trait::async_trait,
    courier_common::types::{AttachmentDescriptor, MediaKind},
    serde::{Deserialize, Serialize},
    tracing::{error, info, warn},
};

use crate::{
    chunk::DeliveryPlan,
    delivery::{DeliveryReport, Dispatcher},
    locks::KeyedLocks,
    markup,
    queue::{CoalescedTurn, TurnHandler},
};

// ── Generator boundary ──────────────────────────────────────────────────────

/// One explicitly labelled part of a structured reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LabelledPart {
    Text { content: String },
    Image { url: String },
    Video { url: String },
    Audio { url: String },
    File { url: String },
}

impl LabelledPart {
    /// Media kind and URL, `None` for text.
    #[must_use]
    pub fn media(&self) -> Option<(MediaKind, &str)> {
        match self {
            Self::Text { .. } => None,
            Self::Image { url } => Some((MediaKind::Image, url)),
            Self::Video { url } => Some((MediaKind::Video, url)),
            Self::Audio { url } => Some((MediaKind::Audio, url)),
            Self::File { url } => Some((MediaKind::File, url)),
        }
    }
}

/// What the reply generator produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Free-form markdown, to be segmented.
    Markdown(String),
    /// Pre-labelled parts, kept in the given order.
    Parts(Vec<LabelledPart>),
}

/// Input handed to the reply generator for one coalesced turn.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub conversation_id: String,
    pub correspondent_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentDescriptor>,
}

impl From<&CoalescedTurn> for ReplyRequest {
    fn from(turn: &CoalescedTurn) -> Self {
        Self {
            conversation_id: turn.conversation.id.clone(),
            correspondent_id: turn.conversation.correspondent_id.clone(),
            text: turn.text.clone(),
            attachments: turn.attachments.clone(),
        }
    }
}

/// Produces the reply for a coalesced turn.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, request: &ReplyRequest) -> anyhow::Result<Reply>;
}

/// Answers every turn by echoing it back. Useful without a configured
/// generator endpoint.
pub struct EchoReplyGenerator;

#[async_trait]
impl ReplyGenerator for EchoReplyGenerator {
    async fn generate(&self, request: &ReplyRequest) -> anyhow::Result<Reply> {
        Ok(Reply::Markdown(format!("Echo: {}", request.text)))
    }
}

/// Ask the generator for a reply, substituting `fallback` on failure.
pub async fn generate_or_fallback(
    generator: &dyn ReplyGenerator,
    request: &ReplyRequest,
    fallback: &str,
) -> Reply {
    match generator.generate(request).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(
                conversation_id = %request.conversation_id,
                error = %e,
                "reply generation failed, sending fallback"
            );
            Reply::Markdown(fallback.to_string())
        },
    }
}

// ── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub char_limit: usize,
    pub translate_markup: bool,
    pub fallback_reply: String,
}

impl From<&courier_config::DeliveryConfig> for ReplySettings {
    fn from(config: &courier_config::DeliveryConfig) -> Self {
        Self {
            char_limit: config.char_limit,
            translate_markup: config.translate_markup,
            fallback_reply: config.fallback_reply.clone(),
        }
    }
}

/// Generate → segment → translate → deliver, for one conversation at a time.
///
/// Turns of the same conversation are handled strictly one after another, so
/// a follow-up reply never interleaves with one still being delivered.
pub struct AutoReply {
    generator: Arc<dyn ReplyGenerator>,
    dispatcher: Dispatcher,
    settings: ReplySettings,
    in_flight: KeyedLocks,
}

impl AutoReply {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        dispatcher: Dispatcher,
        settings: ReplySettings,
    ) -> Self {
        Self {
            generator,
            dispatcher,
            settings,
            in_flight: KeyedLocks::new(),
        }
    }

    /// Build the delivery plan for a reply.
    #[must_use]
    pub fn plan(&self, reply: &Reply) -> DeliveryPlan {
        let plan = DeliveryPlan::from_reply(reply, self.settings.char_limit);
        if self.settings.translate_markup {
            plan.translate_text(self.settings.char_limit, markup::to_channel_markup)
        } else {
            plan
        }
    }

    /// Answer one coalesced turn.
    pub async fn respond(&self, turn: CoalescedTurn) -> DeliveryReport {
        let conversation_id = turn.conversation.id.clone();
        self.in_flight
            .run(&conversation_id, self.generate_and_deliver(turn))
            .await
    }

    async fn generate_and_deliver(&self, turn: CoalescedTurn) -> DeliveryReport {
        let request = ReplyRequest::from(&turn);
        let reply = generate_or_fallback(
            self.generator.as_ref(),
            &request,
            &self.settings.fallback_reply,
        )
        .await;
        let plan = self.plan(&reply);
        info!(
            conversation_id = %turn.conversation.id,
            parts = plan.len(),
            "reply planned"
        );
        let report = self.dispatcher.deliver(&turn.conversation, &plan).await;
        if !report.failures.is_empty() {
            warn!(
                conversation_id = %turn.conversation.id,
                outcome = ?report.outcome(),
                failed = report.failures.len(),
                "reply not fully delivered"
            );
        }
        report
    }
}

#[async_trait]
impl TurnHandler for AutoReply {
    async fn on_ready(&self, turn: CoalescedTurn) {
        self.respond(turn).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::delivery::{
            DeliveryOutcome, DeliverySettings,
            tests::{Call, RecordingOutbound},
        },
        courier_channels::{HistoryStore, InMemoryHistoryStore, NoopEventSink},
        courier_common::types::Conversation,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
    };

    struct FailingGenerator;

    #[async_trait]
    impl ReplyGenerator for FailingGenerator {
        async fn generate(&self, _request: &ReplyRequest) -> anyhow::Result<Reply> {
            anyhow::bail!("model unavailable")
        }
    }

    /// Slow generator that counts how many calls overlap.
    #[derive(Default)]
    struct SlowGenerator {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    #[async_trait]
    impl ReplyGenerator for SlowGenerator {
        async fn generate(&self, request: &ReplyRequest) -> anyhow::Result<Reply> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Reply::Markdown(format!("re: {}", request.text)))
        }
    }

    fn turn(text: &str) -> CoalescedTurn {
        CoalescedTurn {
            conversation: Conversation::new("psid-1"),
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    fn auto_reply(
        generator: Arc<dyn ReplyGenerator>,
        outbound: Arc<RecordingOutbound>,
        history: Arc<InMemoryHistoryStore>,
    ) -> AutoReply {
        let dispatcher = Dispatcher::new(
            outbound,
            history,
            Arc::new(NoopEventSink),
            DeliverySettings::default(),
        );
        let settings = ReplySettings::from(&courier_config::DeliveryConfig::default());
        AutoReply::new(generator, dispatcher, settings)
    }

    #[tokio::test(start_paused = true)]
    async fn generator_failure_sends_fallback() {
        let outbound = Arc::new(RecordingOutbound::default());
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = auto_reply(Arc::new(FailingGenerator), outbound.clone(), history.clone());

        let report = pipeline.respond(turn("hello?")).await;
        assert_eq!(report.outcome(), DeliveryOutcome::Complete);
        assert_eq!(outbound.texts(), vec![
            courier_config::schema::DEFAULT_FALLBACK_REPLY.to_string()
        ]);
        let recorded = history.last_message(&report.conversation_id).await.unwrap().unwrap();
        assert_eq!(recorded.content, courier_config::schema::DEFAULT_FALLBACK_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_is_translated_and_split() {
        let outbound = Arc::new(RecordingOutbound::default());
        let history = Arc::new(InMemoryHistoryStore::new());
        let pipeline = auto_reply(Arc::new(EchoReplyGenerator), outbound.clone(), history);

        pipeline
            .respond(turn("**hi** there\n\n---\n\nsee https://h.example/map.png"))
            .await;

        let calls: Vec<Call> = outbound
            .calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Presence(_)))
            .collect();
        assert_eq!(calls, vec![
            Call::Text("Echo: *hi* there".into()),
            Call::Text("see".into()),
            Call::Media("https://h.example/map.png".into()),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_conversation_is_serialized() {
        let outbound = Arc::new(RecordingOutbound::default());
        let history = Arc::new(InMemoryHistoryStore::new());
        let generator = Arc::new(SlowGenerator::default());
        let pipeline = Arc::new(auto_reply(generator.clone(), outbound.clone(), history));

        let first = turn("one");
        let mut second = turn("two");
        second.conversation = first.conversation.clone();

        let a = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.respond(first).await }
        });
        let b = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.respond(second).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(generator.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(outbound.texts().len(), 2);
        assert_eq!(pipeline.in_flight.len(), 0);
    }

    #[test]
    fn labelled_parts_deserialize() {
        let parts: Vec<LabelledPart> = serde_json::from_str(
            r#"[{"type": "text", "content": "hi"}, {"type": "image", "url": "https://h/a.png"}]"#,
        )
        .unwrap();
        assert_eq!(parts[1].media(), Some((MediaKind::Image, "https://h/a.png")));
        assert_eq!(parts[0].media(), None);
    }
}
