//! Conversation directory: correspondent → conversation, plus assignment.

use {
    courier_common::types::{AssignmentMode, Conversation},
    dashmap::DashMap,
    tracing::info,
};

use crate::error::{Error, Result};

/// Process-wide registry of conversations, safe to share across tasks.
#[derive(Default)]
pub struct ConversationDirectory {
    by_id: DashMap<String, Conversation>,
    by_correspondent: DashMap<String, String>,
}

impl ConversationDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the conversation for a correspondent, creating it on first
    /// contact. The flag is `true` when the conversation is new.
    pub fn get_or_create(&self, correspondent_id: &str) -> (Conversation, bool) {
        let mut created = false;
        let id = self
            .by_correspondent
            .entry(correspondent_id.to_string())
            .or_insert_with(|| {
                let conversation = Conversation::new(correspondent_id);
                let id = conversation.id.clone();
                self.by_id.insert(id.clone(), conversation);
                created = true;
                id
            })
            .clone();

        if created {
            info!(conversation_id = %id, correspondent_id, "conversation created");
        }
        let conversation = self
            .by_id
            .get(&id)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| Conversation::new(correspondent_id));
        (conversation, created)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.by_id.get(id).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn find_by_correspondent(&self, correspondent_id: &str) -> Option<Conversation> {
        let id = self.by_correspondent.get(correspondent_id)?.clone();
        self.get(&id)
    }

    /// Current assignment, `None` for an unknown conversation.
    #[must_use]
    pub fn assignment(&self, id: &str) -> Option<AssignmentMode> {
        self.by_id.get(id).map(|entry| entry.assignment)
    }

    /// Hand a conversation to a human operator or back to automation.
    pub fn set_assignment(&self, id: &str, mode: AssignmentMode) -> Result<Conversation> {
        let mut entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| Error::unknown_conversation(id))?;
        if entry.assignment != mode {
            info!(conversation_id = %id, ?mode, "assignment changed");
            entry.assignment = mode;
        }
        Ok(entry.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
