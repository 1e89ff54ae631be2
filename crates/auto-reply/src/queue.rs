//! Per-conversation debounce of inbound fragments.
//!
//! Correspondents often type one thought as several short messages. Each new
//! fragment restarts the conversation's quiet-period timer; when the timer
//! runs out the pending fragments are joined into one turn and handed to the
//! [`TurnHandler`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    courier_common::types::{AttachmentDescriptor, Conversation},
    dashmap::DashMap,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::conversations::ConversationDirectory;

/// Fragments of one conversation, joined once the quiet period elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedTurn {
    pub conversation: Conversation,
    /// Fragment texts joined with newlines, in arrival order.
    pub text: String,
    pub attachments: Vec<AttachmentDescriptor>,
}

/// Receives coalesced turns.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn on_ready(&self, turn: CoalescedTurn);
}

struct PendingAggregation {
    fragments: Vec<String>,
    attachments: Vec<AttachmentDescriptor>,
    /// Identifies the timer allowed to flush this entry.
    generation: u64,
    timer: CancellationToken,
}

struct Inner {
    pending: DashMap<String, PendingAggregation>,
    directory: Arc<ConversationDirectory>,
    handler: Arc<dyn TurnHandler>,
    quiet_period: Duration,
    next_generation: AtomicU64,
}

/// Debounces inbound fragments per conversation. Cheap to clone.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

impl Aggregator {
    pub fn new(
        quiet_period: Duration,
        directory: Arc<ConversationDirectory>,
        handler: Arc<dyn TurnHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                directory,
                handler,
                quiet_period,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Add a fragment and restart the conversation's quiet-period timer.
    ///
    /// Blank text is not stored, but still counts as activity.
    pub fn submit(
        &self,
        conversation_id: &str,
        text: Option<&str>,
        attachments: Vec<AttachmentDescriptor>,
    ) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = CancellationToken::new();
        let fragments = {
            let mut entry = self
                .inner
                .pending
                .entry(conversation_id.to_string())
                .or_insert_with(|| PendingAggregation {
                    fragments: Vec::new(),
                    attachments: Vec::new(),
                    generation,
                    timer: CancellationToken::new(),
                });
            entry.timer.cancel();
            if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                entry.fragments.push(text.to_string());
            }
            entry.attachments.extend(attachments);
            entry.generation = generation;
            entry.timer = timer.clone();
            entry.fragments.len()
        };
        debug!(conversation_id, generation, fragments, "fragment queued, quiet period restarted");

        let inner = Arc::clone(&self.inner);
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {},
                _ = tokio::time::sleep(inner.quiet_period) => {
                    inner.fire(&conversation_id, generation).await;
                },
            }
        });
    }

    /// Flush a conversation right away, skipping the rest of its quiet period.
    /// Returns `false` when nothing was pending.
    pub async fn flush_now(&self, conversation_id: &str) -> bool {
        let Some((_, pending)) = self.inner.pending.remove(conversation_id) else {
            return false;
        };
        pending.timer.cancel();
        self.inner.dispatch(conversation_id, pending).await;
        true
    }

    /// Conversations with fragments waiting for their quiet period.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Cancel every timer and discard pending fragments. The fragments are
    /// already in history; only the automated reply is lost.
    pub fn shutdown(&self) {
        let mut dropped = 0usize;
        self.inner.pending.retain(|_, pending| {
            pending.timer.cancel();
            dropped += 1;
            false
        });
        if dropped > 0 {
            info!(dropped, "aggregator shut down with pending conversations");
        }
    }
}

impl Inner {
    async fn fire(&self, conversation_id: &str, generation: u64) {
        // A newer fragment may have claimed the entry between the timer
        // elapsing and this task running.
        let Some((_, pending)) = self
            .pending
            .remove_if(conversation_id, |_, pending| pending.generation == generation)
        else {
            debug!(conversation_id, generation, "stale timer, newer fragment pending");
            return;
        };
        self.dispatch(conversation_id, pending).await;
    }

    async fn dispatch(&self, conversation_id: &str, pending: PendingAggregation) {
        let text = pending.fragments.join("\n");
        if text.trim().is_empty() {
            debug!(conversation_id, "nothing to answer after quiet period, dropping");
            return;
        }

        let Some(conversation) = self.directory.get(conversation_id) else {
            warn!(conversation_id, "quiet period elapsed for unknown conversation");
            return;
        };
        if !conversation.assignment.is_automated() {
            info!(
                conversation_id,
                fragments = pending.fragments.len(),
                "conversation assigned to a human, skipping automated reply"
            );
            return;
        }

        info!(
            conversation_id,
            fragments = pending.fragments.len(),
            attachments = pending.attachments.len(),
            "quiet period elapsed, turn ready"
        );
        self.handler
            .on_ready(CoalescedTurn {
                conversation,
                text,
                attachments: pending.attachments,
            })
            .await;
    }
}
