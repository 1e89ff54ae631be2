use std::collections::HashMap;

use {
    anyhow::Result,
    async_trait::async_trait,
    courier_common::types::Turn,
    tokio::sync::RwLock,
};

/// Append-only history of turns plus a "last message" pointer per conversation.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, turn: Turn) -> Result<()>;
    async fn last_message(&self, conversation_id: &str) -> Result<Option<Turn>>;
    async fn list(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>>;
}

/// Process-local history store.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    turns: RwLock<HashMap<String, Vec<Turn>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, turn: Turn) -> Result<()> {
        let mut turns = self.turns.write().await;
        turns
            .entry(turn.conversation_id.clone())
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn last_message(&self, conversation_id: &str) -> Result<Option<Turn>> {
        let turns = self.turns.read().await;
        Ok(turns
            .get(conversation_id)
            .and_then(|history| history.last().cloned()))
    }

    /// Most recent `limit` turns, oldest first.
    async fn list(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        let turns = self.turns.read().await;
        let Some(history) = turns.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}
