use crate::{
    conversation::{
        conversation_models::{Conversation, NewConversation},
        conversation_repository::{insert_conversation, load_conversation},
    },
    db::{with_transaction, DbPool},
    error::{AppError, Result},
};
use async_trait::async_trait;
use std::collections::HashMap;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;
use super::message_models::{Message, MessageType, NewMessage};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Writes `message` and points its conversation's last message at it, as
    /// one atomic unit. When `new_conversation` is given it is created in the
    /// same unit. Nothing is visible unless every write succeeds.
    async fn persist(
        &self,
        new_conversation: Option<NewConversation>,
        message: NewMessage,
    ) -> Result<(Conversation, Message)>;

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Message>>;

    /// Page of a conversation's messages, newest first, plus the total.
    async fn list_for_conversation(
        &self,
        conversation_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Message>, i64)>;

    async fn update_content(
        &self,
        message_id: Uuid,
        content: &str,
        tagged_users: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Message>;

    async fn soft_delete(&self, message_id: Uuid, at: DateTime<Utc>) -> Result<Message>;

    /// Unread counts for `viewer` across several conversations in one call.
    /// A message counts when another member sent it, it is live, and it was
    /// created after the viewer last entered (always, if they never did).
    /// Conversations with nothing unread may be absent from the map.
    async fn count_unread_many(
        &self,
        viewer: Uuid,
        conversation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>>;
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: String,
    tagged_users: Vec<Uuid>,
    replies: Vec<Uuid>,
    level: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self> {
        let message_type = row
            .message_type
            .parse::<MessageType>()
            .map_err(AppError::Dependency)?;

        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            message_type,
            tagged_users: row.tagged_users,
            replies: row.replies,
            level: row.level,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

fn not_found() -> AppError {
    AppError::NotFound("Message not found".to_string())
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn persist(
        &self,
        new_conversation: Option<NewConversation>,
        message: NewMessage,
    ) -> Result<(Conversation, Message)> {
        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                if let Some(conversation) = &new_conversation {
                    insert_conversation(&mut **tx, conversation).await?;
                }

                let row = sqlx::query_as::<_, MessageRow>(
                    "INSERT INTO messages (id, conversation_id, sender_id, content, message_type, tagged_users, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                     RETURNING *"
                )
                .bind(message.id)
                .bind(message.conversation_id)
                .bind(message.sender_id)
                .bind(&message.content)
                .bind(message.message_type.to_string())
                .bind(&message.tagged_users)
                .bind(message.created_at)
                .fetch_one(&mut **tx)
                .await?;

                // Targeted update: concurrent entry-time writes on member rows are untouched.
                let result = sqlx::query(
                    "UPDATE conversations SET last_message_id = $1, updated_at = $2 WHERE id = $3"
                )
                .bind(message.id)
                .bind(message.created_at)
                .bind(message.conversation_id)
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(AppError::NotFound("Conversation not found".to_string()));
                }

                let conversation = load_conversation(&mut **tx, message.conversation_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

                Ok((conversation, Message::try_from(row)?))
            })
        })
        .await
    }

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        into_messages(rows)
    }

    async fn list_for_conversation(
        &self,
        conversation_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Message>, i64)> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages
             WHERE conversation_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((into_messages(rows)?, total))
    }

    async fn update_content(
        &self,
        message_id: Uuid,
        content: &str,
        tagged_users: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE messages SET content = $1, tagged_users = $2, updated_at = $3
             WHERE id = $4 AND deleted_at IS NULL
             RETURNING *"
        )
        .bind(content)
        .bind(tagged_users)
        .bind(at)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(not_found)?;

        Message::try_from(row)
    }

    async fn soft_delete(&self, message_id: Uuid, at: DateTime<Utc>) -> Result<Message> {
        let row = sqlx::query_as::<_, MessageRow>(
            "UPDATE messages SET deleted_at = $1
             WHERE id = $2 AND deleted_at IS NULL
             RETURNING *"
        )
        .bind(at)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(not_found)?;

        Message::try_from(row)
    }

    async fn count_unread_many(
        &self,
        viewer: Uuid,
        conversation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>> {
        if conversation_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT m.conversation_id, COUNT(*)
             FROM messages m
             LEFT JOIN conversation_members cm
               ON cm.conversation_id = m.conversation_id AND cm.user_id = $1
             WHERE m.conversation_id = ANY($2)
               AND m.sender_id <> $1
               AND m.deleted_at IS NULL
               AND (cm.last_entered_at IS NULL OR m.created_at > cm.last_entered_at)
             GROUP BY m.conversation_id"
        )
        .bind(viewer)
        .bind(conversation_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }
}
