//! Two-party conversations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Message;
use crate::shared::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    /// Stored with `participant_a < participant_b` so each pair has one row
    /// per project.
    pub participant_a: i64,
    pub participant_b: i64,
    pub project_id: Option<i64>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: i64, first: i64, second: i64, project_id: Option<i64>) -> Self {
        let (participant_a, participant_b) = ordered_pair(first, second);
        Self {
            id,
            participant_a,
            participant_b,
            project_id,
            last_message_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_participant(&self, user_id: i64) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    pub fn other_participant(&self, user_id: i64) -> Option<i64> {
        if self.participant_a == user_id {
            Some(self.participant_b)
        } else if self.participant_b == user_id {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

pub fn ordered_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Conversation list row for one viewer.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Conversation>, AppError>;

    async fn find_between(
        &self,
        first: i64,
        second: i64,
        project_id: Option<i64>,
    ) -> Result<Option<Conversation>, AppError>;

    /// Insert `conversation`, or return the one already stored for the
    /// same pair and project.
    async fn find_or_create(&self, conversation: &Conversation) -> Result<Conversation, AppError>;

    /// Most recently active first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ConversationSummary>, AppError>;

    /// Insert and bump the conversation's `last_message_at`.
    async fn add_message(&self, message: &Message) -> Result<Message, AppError>;

    /// Newest first, strictly older than `before` when given.
    async fn list_messages(
        &self,
        conversation_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError>;

    /// Mark every message not sent by `reader_id` as read. Returns how many
    /// changed.
    async fn mark_read(&self, conversation_id: i64, reader_id: i64) -> Result<u64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_normalized() {
        let c = Conversation::new(1, 9, 4, None);
        assert_eq!((c.participant_a, c.participant_b), (4, 9));
        assert_eq!(c.other_participant(9), Some(4));
        assert_eq!(c.other_participant(5), None);
    }
}
