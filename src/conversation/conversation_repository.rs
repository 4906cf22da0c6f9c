use crate::{
    db::{with_transaction, DbPool},
    error::{AppError, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use uuid::Uuid;
use super::conversation_models::{Conversation, ConversationFilter, ConversationType, NewConversation};

/// Persistence operations on conversations and their membership.
///
/// Mutations of a single conversation are targeted updates (membership rows,
/// one member's entry time, details) rather than whole-record rewrites.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_by_id(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    /// Conversation of `conversation_type` whose member set is exactly `members`.
    async fn find_by_members(
        &self,
        members: &[Uuid],
        conversation_type: ConversationType,
    ) -> Result<Option<Conversation>>;

    /// Page of the member's conversations, most recently updated first, plus the total.
    async fn list_for_member(
        &self,
        user_id: Uuid,
        filter: &ConversationFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Conversation>, i64)>;

    async fn create(&self, conversation: NewConversation) -> Result<Conversation>;

    async fn update_details(
        &self,
        conversation_id: Uuid,
        name: Option<String>,
        thumbnail: Option<String>,
    ) -> Result<Conversation>;

    /// Appends members that are not already present.
    async fn add_members(&self, conversation_id: Uuid, members: &[Uuid]) -> Result<Conversation>;

    /// Removes members. Returns `None` when the conversation was deleted
    /// because a group lost its last member.
    async fn remove_members(
        &self,
        conversation_id: Uuid,
        members: &[Uuid],
    ) -> Result<Option<Conversation>>;

    /// Records when `user_id` last entered the conversation. Returns false if
    /// the user is not a member.
    async fn set_last_entered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    conversation_type: String,
    name: Option<String>,
    thumbnail: Option<String>,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    conversation_id: Uuid,
    user_id: Uuid,
    last_entered_at: Option<DateTime<Utc>>,
}

/// Attaches ordered membership to conversation rows, keeping row order.
async fn hydrate(conn: &mut PgConnection, rows: Vec<ConversationRow>) -> Result<Vec<Conversation>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let member_rows = sqlx::query_as::<_, MemberRow>(
        "SELECT conversation_id, user_id, last_entered_at FROM conversation_members
         WHERE conversation_id = ANY($1)
         ORDER BY conversation_id, position ASC"
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut members: HashMap<Uuid, Vec<MemberRow>> = HashMap::new();
    for member in member_rows {
        members.entry(member.conversation_id).or_default().push(member);
    }

    rows.into_iter()
        .map(|row| {
            let conversation_type = row
                .conversation_type
                .parse::<ConversationType>()
                .map_err(AppError::Dependency)?;
            let rows = members.remove(&row.id).unwrap_or_default();
            let last_time_enter_chat = rows
                .iter()
                .filter_map(|m| m.last_entered_at.map(|at| (m.user_id, at)))
                .collect();

            Ok(Conversation {
                id: row.id,
                conversation_type,
                members: rows.iter().map(|m| m.user_id).collect(),
                name: row.name,
                thumbnail: row.thumbnail,
                last_message_id: row.last_message_id,
                last_time_enter_chat,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .collect()
}

pub(crate) async fn load_conversation(
    conn: &mut PgConnection,
    conversation_id: Uuid,
) -> Result<Option<Conversation>> {
    let row = sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations WHERE id = $1")
        .bind(conversation_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Writes a planned conversation and its membership.
pub(crate) async fn insert_conversation(
    conn: &mut PgConnection,
    conversation: &NewConversation,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO conversations (id, conversation_type, name, thumbnail, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $5)"
    )
    .bind(conversation.id)
    .bind(conversation.conversation_type.to_string())
    .bind(conversation.name.as_deref())
    .bind(conversation.thumbnail.as_deref())
    .bind(conversation.created_at)
    .execute(&mut *conn)
    .await?;

    append_members(conn, conversation.id, &conversation.members).await?;

    for (user_id, at) in &conversation.last_time_enter_chat {
        sqlx::query(
            "UPDATE conversation_members SET last_entered_at = $3
             WHERE conversation_id = $1 AND user_id = $2"
        )
        .bind(conversation.id)
        .bind(user_id)
        .bind(at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn append_members(conn: &mut PgConnection, conversation_id: Uuid, members: &[Uuid]) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO conversation_members (conversation_id, user_id, position)
         SELECT $1, m.user_id,
                (SELECT COALESCE(MAX(position), 0) FROM conversation_members WHERE conversation_id = $1) + m.ord::int
         FROM UNNEST($2::uuid[]) WITH ORDINALITY AS m(user_id, ord)
         ON CONFLICT (conversation_id, user_id) DO NOTHING"
    )
    .bind(conversation_id)
    .bind(members)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn touch(conn: &mut PgConnection, conversation_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
        .bind(conversation_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

fn not_found() -> AppError {
    AppError::NotFound("Conversation not found".to_string())
}

#[derive(Clone)]
pub struct ConversationRepository {
    pool: DbPool,
}

impl ConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn find_by_id(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        load_conversation(&mut conn, conversation_id).await
    }

    async fn find_by_members(
        &self,
        members: &[Uuid],
        conversation_type: ConversationType,
    ) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;

        // Exact set: same cardinality and every member row is one of `members`.
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT c.* FROM conversations c
             WHERE c.conversation_type = $2
               AND (SELECT COUNT(*) FROM conversation_members m WHERE m.conversation_id = c.id) = $3
               AND (SELECT COUNT(*) FROM conversation_members m
                    WHERE m.conversation_id = c.id AND m.user_id = ANY($1)) = $3
             ORDER BY c.created_at ASC
             LIMIT 1"
        )
        .bind(members)
        .bind(conversation_type.to_string())
        .bind(members.len() as i64)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_for_member(
        &self,
        user_id: Uuid,
        filter: &ConversationFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Conversation>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let conversation_type = filter.conversation_type.map(|t| t.to_string());
        let pattern = filter.query.as_ref().map(|q| format!("%{}%", q));

        let where_clause = "WHERE EXISTS (SELECT 1 FROM conversation_members m
                                WHERE m.conversation_id = c.id AND m.user_id = $1)
               AND ($2::text IS NULL OR c.conversation_type = $2)
               AND ($3::text IS NULL
                    OR c.name ILIKE $3
                    OR EXISTS (SELECT 1 FROM conversation_members m2
                               JOIN users u ON u.id = m2.user_id
                               WHERE m2.conversation_id = c.id
                                 AND (u.username ILIKE $3 OR u.email ILIKE $3)))";

        let rows = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT c.* FROM conversations c {} ORDER BY c.updated_at DESC LIMIT $4 OFFSET $5",
            where_clause
        ))
        .bind(user_id)
        .bind(conversation_type.as_deref())
        .bind(pattern.as_deref())
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *conn)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM conversations c {}",
            where_clause
        ))
        .bind(user_id)
        .bind(conversation_type.as_deref())
        .bind(pattern.as_deref())
        .fetch_one(&mut *conn)
        .await?;

        let conversations = hydrate(&mut conn, rows).await?;
        Ok((conversations, total))
    }

    async fn create(&self, conversation: NewConversation) -> Result<Conversation> {
        let conversation_id = conversation.id;

        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                insert_conversation(&mut **tx, &conversation).await?;
                load_conversation(&mut **tx, conversation_id)
                    .await?
                    .ok_or_else(not_found)
            })
        })
        .await
    }

    async fn update_details(
        &self,
        conversation_id: Uuid,
        name: Option<String>,
        thumbnail: Option<String>,
    ) -> Result<Conversation> {
        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                let result = sqlx::query(
                    "UPDATE conversations
                     SET name = COALESCE($1, name),
                         thumbnail = COALESCE($2, thumbnail),
                         updated_at = NOW()
                     WHERE id = $3"
                )
                .bind(name.as_deref())
                .bind(thumbnail.as_deref())
                .bind(conversation_id)
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(not_found());
                }

                load_conversation(&mut **tx, conversation_id)
                    .await?
                    .ok_or_else(not_found)
            })
        })
        .await
    }

    async fn add_members(&self, conversation_id: Uuid, members: &[Uuid]) -> Result<Conversation> {
        let members = members.to_vec();

        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                append_members(&mut **tx, conversation_id, &members).await?;
                touch(&mut **tx, conversation_id).await?;
                load_conversation(&mut **tx, conversation_id)
                    .await?
                    .ok_or_else(not_found)
            })
        })
        .await
    }

    async fn remove_members(
        &self,
        conversation_id: Uuid,
        members: &[Uuid],
    ) -> Result<Option<Conversation>> {
        let members = members.to_vec();

        with_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                sqlx::query(
                    "DELETE FROM conversation_members
                     WHERE conversation_id = $1 AND user_id = ANY($2)"
                )
                .bind(conversation_id)
                .bind(&members)
                .execute(&mut **tx)
                .await?;
                touch(&mut **tx, conversation_id).await?;

                let conversation = load_conversation(&mut **tx, conversation_id)
                    .await?
                    .ok_or_else(not_found)?;

                if conversation.members.is_empty()
                    && conversation.conversation_type == ConversationType::Group
                {
                    sqlx::query("DELETE FROM conversations WHERE id = $1")
                        .bind(conversation_id)
                        .execute(&mut **tx)
                        .await?;
                    return Ok(None);
                }

                Ok(Some(conversation))
            })
        })
        .await
    }

    async fn set_last_entered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE conversation_members SET last_entered_at = $3
             WHERE conversation_id = $1 AND user_id = $2"
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
