use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use super::user_models::{User, UserSummary};

/// Read/write access to user accounts as seen by the chat services.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Display projections for every id that exists. Unknown ids are skipped.
    async fn find_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>>;

    /// Number of distinct ids in `ids` that belong to an existing user.
    async fn count_existing(&self, ids: &[Uuid]) -> Result<i64>;

    async fn search(&self, query: Option<&str>, skip: i64, limit: i64) -> Result<(Vec<User>, i64)>;

    /// True when another account already uses `username`.
    async fn username_taken(&self, username: &str, except: Uuid) -> Result<bool>;

    async fn update_username(&self, user_id: Uuid, username: &str) -> Result<Option<User>>;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT id, username, avatar FROM users WHERE id = ANY($1)"
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn count_existing(&self, ids: &[Uuid]) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn search(&self, query: Option<&str>, skip: i64, limit: i64) -> Result<(Vec<User>, i64)> {
        let pattern = query.map(|q| format!("%{}%", q));

        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        )
        .bind(pattern.as_deref())
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users
             WHERE ($1::text IS NULL OR username ILIKE $1 OR email ILIKE $1)"
        )
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok((users, total))
    }

    async fn username_taken(&self, username: &str, except: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE username = $1 AND id <> $2"
        )
        .bind(username)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET username = $1, updated_at = NOW() WHERE id = $2 RETURNING *"
        )
        .bind(username)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
