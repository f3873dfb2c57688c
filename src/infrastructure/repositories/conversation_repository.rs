//! Conversation and Message Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    ordered_pair, Conversation, ConversationRepository, ConversationSummary, Message,
};
use crate::shared::error::AppError;

const CONVERSATION_COLUMNS: &str =
    "id, participant_a, participant_b, project_id, last_message_at, created_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, read_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: i64,
    participant_a: i64,
    participant_b: i64,
    project_id: Option<i64>,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            participant_a: row.participant_a,
            participant_b: row.participant_b,
            project_id: row.project_id,
            last_message_at: row.last_message_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    sender_id: i64,
    content: String,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

/// Conversation joined with its latest message and the viewer's unread count.
#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    participant_a: i64,
    participant_b: i64,
    project_id: Option<i64>,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    message_id: Option<i64>,
    message_sender_id: Option<i64>,
    message_content: Option<String>,
    message_read_at: Option<DateTime<Utc>>,
    message_created_at: Option<DateTime<Utc>>,
    unread_count: i64,
}

impl From<SummaryRow> for ConversationSummary {
    fn from(row: SummaryRow) -> Self {
        let last_message = match (
            row.message_id,
            row.message_sender_id,
            row.message_content,
            row.message_created_at,
        ) {
            (Some(id), Some(sender_id), Some(content), Some(created_at)) => Some(Message {
                id,
                conversation_id: row.id,
                sender_id,
                content,
                read_at: row.message_read_at,
                created_at,
            }),
            _ => None,
        };

        ConversationSummary {
            conversation: Conversation {
                id: row.id,
                participant_a: row.participant_a,
                participant_b: row.participant_b,
                project_id: row.project_id,
                last_message_at: row.last_message_at,
                created_at: row.created_at,
            },
            last_message,
            unread_count: row.unread_count,
        }
    }
}

/// PostgreSQL conversation repository.
#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Conversation>, AppError> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1");
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Conversation::from))
    }

    async fn find_between(
        &self,
        first: i64,
        second: i64,
        project_id: Option<i64>,
    ) -> Result<Option<Conversation>, AppError> {
        let (a, b) = ordered_pair(first, second);
        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE participant_a = $1 AND participant_b = $2
              AND project_id IS NOT DISTINCT FROM $3
            "#
        );
        let row = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(a)
            .bind(b)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Conversation::from))
    }

    async fn find_or_create(&self, conversation: &Conversation) -> Result<Conversation, AppError> {
        let sql = format!(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b, project_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (participant_a, participant_b, (COALESCE(project_id, 0))) DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, ConversationRow>(&sql)
            .bind(conversation.id)
            .bind(conversation.participant_a)
            .bind(conversation.participant_b)
            .bind(conversation.project_id)
            .bind(conversation.created_at)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // A concurrent start won the insert
        self.find_between(
            conversation.participant_a,
            conversation.participant_b,
            conversation.project_id,
        )
        .await?
        .ok_or_else(|| AppError::Internal("conversation vanished after conflict".into()))
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<ConversationSummary>, AppError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT c.id, c.participant_a, c.participant_b, c.project_id,
                   c.last_message_at, c.created_at,
                   m.id AS message_id,
                   m.sender_id AS message_sender_id,
                   m.content AS message_content,
                   m.read_at AS message_read_at,
                   m.created_at AS message_created_at,
                   (SELECT COUNT(*) FROM messages u
                    WHERE u.conversation_id = c.id
                      AND u.sender_id <> $1
                      AND u.read_at IS NULL) AS unread_count
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT id, sender_id, content, read_at, created_at
                FROM messages
                WHERE conversation_id = c.id
                ORDER BY id DESC
                LIMIT 1
            ) m ON TRUE
            WHERE c.participant_a = $1 OR c.participant_b = $1
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationSummary::from).collect())
    }

    async fn add_message(&self, message: &Message) -> Result<Message, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message.id)
            .bind(message.conversation_id)
            .bind(message.sender_id)
            .bind(&message.content)
            .bind(message.created_at)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
            .bind(message.conversation_id)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1 AND ($2::bigint IS NULL OR id < $2)
            ORDER BY id DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(conversation_id)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn mark_read(&self, conversation_id: i64, reader_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET read_at = NOW()
            WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
