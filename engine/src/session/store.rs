//! Session storage
//!
//! Conversations live behind [`SessionStore`] so the in-memory map can be
//! swapped for a durable backend without touching the manager.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::types::SessionStatus;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::SessionError;
use crate::conversation::Conversation;

/// Listing entry for a stored conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub status: SessionStatus,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            status: conversation.status,
            turns: conversation.transcript.len(),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Conversation>, SessionError>;

    /// Insert or replace by id
    async fn put(&self, conversation: Conversation) -> Result<(), SessionError>;

    /// Returns whether anything was removed
    async fn delete(&self, id: &str) -> Result<bool, SessionError>;

    /// Newest first
    async fn list(&self) -> Result<Vec<ConversationSummary>, SessionError>;
}

/// Process-local store with no eviction and no durability
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<Conversation>, SessionError> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn put(&self, conversation: Conversation) -> Result<(), SessionError> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self.conversations.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, SessionError> {
        let mut summaries: Vec<ConversationSummary> = self
            .conversations
            .read()
            .await
            .values()
            .map(ConversationSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}
