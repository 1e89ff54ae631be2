use std::sync::Arc;

use {
    courier_channels::{ChannelEvent, ChannelEventSink, HistoryStore},
    courier_common::types::{AssignmentMode, Conversation, InboundEvent, Turn, TurnSide, now_ms},
    tracing::{debug, info},
};

use crate::{
    conversations::ConversationDirectory,
    error::{Context, Result},
    locks::KeyedLocks,
    markup,
    queue::Aggregator,
};

/// Entry point for channel events: records each inbound message and feeds
/// it to the aggregator.
pub struct Inbox {
    directory: Arc<ConversationDirectory>,
    aggregator: Aggregator,
    history: Arc<dyn HistoryStore>,
    events: Arc<dyn ChannelEventSink>,
    translate_markup: bool,
    arrivals: KeyedLocks,
}

impl Inbox {
    pub fn new(
        directory: Arc<ConversationDirectory>,
        aggregator: Aggregator,
        history: Arc<dyn HistoryStore>,
        events: Arc<dyn ChannelEventSink>,
        translate_markup: bool,
    ) -> Self {
        Self {
            directory,
            aggregator,
            history,
            events,
            translate_markup,
            arrivals: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<ConversationDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Accept one inbound event.
    ///
    /// The turn is written to history before it is queued, whatever the
    /// conversation's assignment; whether it is answered is decided when the
    /// quiet period ends. Blank events are not recorded but still restart
    /// the quiet period.
    ///
    /// Events from one correspondent are handled one at a time in the order
    /// they arrive, so their fragments are queued in that order however long
    /// each history write takes.
    pub async fn receive(&self, event: InboundEvent) -> Result<Conversation> {
        event.validate()?;
        let sender_id = event.sender_id.clone();
        self.arrivals.run(&sender_id, self.accept(event)).await
    }

    async fn accept(&self, event: InboundEvent) -> Result<Conversation> {
        let (conversation, _) = self.directory.get_or_create(&event.sender_id);

        let text = event.text().map(|text| {
            if self.translate_markup {
                markup::to_authoring_markdown(text)
            } else {
                text.to_string()
            }
        });

        if event.has_content() {
            self.history
                .append(Turn {
                    conversation_id: conversation.id.clone(),
                    side: TurnSide::Correspondent,
                    content: text.clone().unwrap_or_default(),
                    attachments: event.attachments.clone(),
                    timestamp: event.timestamp.unwrap_or_else(now_ms),
                })
                .await
                .with_context(|| format!("recording inbound turn for {}", conversation.id))?;

            debug!(
                conversation_id = %conversation.id,
                has_text = text.is_some(),
                attachments = event.attachments.len(),
                "inbound turn recorded"
            );
            self.events
                .emit(ChannelEvent::InboundMessage {
                    conversation_id: conversation.id.clone(),
                    correspondent_id: conversation.correspondent_id.clone(),
                    text: text.clone(),
                    attachment_count: event.attachments.len(),
                })
                .await;
        }

        self.aggregator
            .submit(&conversation.id, text.as_deref(), event.attachments);
        Ok(conversation)
    }

    /// Change who answers a conversation and notify observers.
    pub async fn set_assignment(
        &self,
        conversation_id: &str,
        mode: AssignmentMode,
    ) -> Result<Conversation> {
        let conversation = self.directory.set_assignment(conversation_id, mode)?;
        info!(conversation_id, ?mode, "conversation reassigned");
        self.events
            .emit(ChannelEvent::AssignmentChanged {
                conversation_id: conversation.id.clone(),
                mode,
            })
            .await;
        Ok(conversation)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            delivery::tests::RecordingSink,
            error::Error,
            queue::{CoalescedTurn, TurnHandler},
        },
        async_trait::async_trait,
        courier_channels::InMemoryHistoryStore,
        courier_common::types::{AttachmentDescriptor, AttachmentKind},
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
        tokio::sync::mpsc,
    };

    struct Forward(mpsc::UnboundedSender<CoalescedTurn>);

    #[async_trait]
    impl TurnHandler for Forward {
        async fn on_ready(&self, turn: CoalescedTurn) {
            let _ = self.0.send(turn);
        }
    }

    struct Fixture {
        inbox: Inbox,
        history: Arc<InMemoryHistoryStore>,
        sink: Arc<RecordingSink>,
        turns: mpsc::UnboundedReceiver<CoalescedTurn>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(ConversationDirectory::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let (tx, turns) = mpsc::unbounded_channel();
        let aggregator = Aggregator::new(
            Duration::from_secs(3),
            directory.clone(),
            Arc::new(Forward(tx)),
        );
        let inbox = Inbox::new(directory, aggregator, history.clone(), sink.clone(), true);
        Fixture {
            inbox,
            history,
            sink,
            turns,
        }
    }

    fn event(sender: &str, text: Option<&str>) -> InboundEvent {
        InboundEvent {
            sender_id: sender.into(),
            text: text.map(str::to_string),
            attachments: Vec::new(),
            timestamp: Some(1_700_000_000_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn receive_records_and_queues() {
        let mut f = fixture();
        let conversation = f
            .inbox
            .receive(event("psid-1", Some("I need *help*")))
            .await
            .unwrap();

        let recorded = f
            .history
            .last_message(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded.side, TurnSide::Correspondent);
        assert_eq!(recorded.content, "I need **help**");
        assert_eq!(recorded.timestamp, 1_700_000_000_000);
        assert_eq!(f.inbox.aggregator().pending_count(), 1);

        let turn = f.turns.recv().await.unwrap();
        assert_eq!(turn.text, "I need **help**");
        assert!(matches!(
            f.sink.events.lock().unwrap().first(),
            Some(ChannelEvent::InboundMessage { .. })
        ));
    }

    /// History whose first write stalls, as a cold database connection would.
    #[derive(Default)]
    struct StallingHistory {
        inner: InMemoryHistoryStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for StallingHistory {
        async fn append(&self, turn: Turn) -> anyhow::Result<()> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.append(turn).await
        }

        async fn last_message(&self, conversation_id: &str) -> anyhow::Result<Option<Turn>> {
            self.inner.last_message(conversation_id).await
        }

        async fn list(&self, conversation_id: &str, limit: usize) -> anyhow::Result<Vec<Turn>> {
            self.inner.list(conversation_id, limit).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fragments_keep_arrival_order() {
        let directory = Arc::new(ConversationDirectory::new());
        let history = Arc::new(StallingHistory::default());
        let (tx, mut turns) = mpsc::unbounded_channel();
        let aggregator = Aggregator::new(
            Duration::from_secs(3),
            directory.clone(),
            Arc::new(Forward(tx)),
        );
        let inbox = Arc::new(Inbox::new(
            directory,
            aggregator,
            history.clone(),
            Arc::new(RecordingSink::default()),
            false,
        ));

        let handles: Vec<_> = ["F1", "F2"]
            .into_iter()
            .map(|text| {
                let inbox = Arc::clone(&inbox);
                tokio::spawn(async move { inbox.receive(event("psid-1", Some(text))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(turns.recv().await.unwrap().text, "F1\nF2");
        let conversation = inbox.directory().find_by_correspondent("psid-1").unwrap();
        let recorded: Vec<String> = history
            .list(&conversation.id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|turn| turn.content)
            .collect();
        assert_eq!(recorded, vec!["F1", "F2"]);
    }

    #[tokio::test]
    async fn invalid_event_is_rejected() {
        let f = fixture();
        let mut undated = event("psid-1", Some("hi"));
        undated.timestamp = None;
        let err = f.inbox.receive(undated).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));
        assert!(f.inbox.directory().is_empty());

        let err = f.inbox.receive(event("", Some("hi"))).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn blank_event_is_not_recorded() {
        let f = fixture();
        let conversation = f.inbox.receive(event("psid-1", Some("   "))).await.unwrap();
        assert!(f.history.list(&conversation.id, 10).await.unwrap().is_empty());
        assert_eq!(f.inbox.aggregator().pending_count(), 1);
        assert!(f.sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn attachment_only_event_is_recorded() {
        let f = fixture();
        let mut photo = event("psid-1", None);
        photo.attachments.push(AttachmentDescriptor::new(
            AttachmentKind::Image,
            Some("https://h/p.jpg".into()),
        ));
        let conversation = f.inbox.receive(photo).await.unwrap();
        let recorded = f.history.list(&conversation.id, 10).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].attachments.len(), 1);
    }

    #[tokio::test]
    async fn reassignment_emits_event() {
        let f = fixture();
        let conversation = f.inbox.receive(event("psid-1", Some("hi"))).await.unwrap();
        let updated = f
            .inbox
            .set_assignment(&conversation.id, AssignmentMode::Human)
            .await
            .unwrap();
        assert_eq!(updated.assignment, AssignmentMode::Human);
        assert!(matches!(
            f.sink.events.lock().unwrap().last(),
            Some(ChannelEvent::AssignmentChanged {
                mode: AssignmentMode::Human,
                ..
            })
        ));
    }
}
