use crate::{
    error::{AppError, Result},
    pagination::{PaginatedResponse, Pagination},
    user::{
        user_dto::{SearchUsersQuery, UpdateProfileRequest},
        user_models::UserResponse,
        user_repository::UserDirectory,
    },
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserDirectory>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    pub async fn get_current_user(&self, user_id: Uuid) -> Result<UserResponse> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(user.into())
    }

    pub async fn update_current_user(
        &self,
        user_id: Uuid,
        payload: UpdateProfileRequest,
    ) -> Result<UserResponse> {
        if let Some(field) = payload.other.keys().min() {
            return Err(AppError::invalid_field(
                field.clone(),
                "Only username can be updated",
            ));
        }

        let username = payload.username.trim();
        if self.users.username_taken(username, user_id).await? {
            return Err(AppError::Conflict(
                "Username already taken, please choose another".to_string(),
            ));
        }

        let user = self
            .users
            .update_username(user_id, username)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id = %user_id, "Profile updated");

        Ok(user.into())
    }

    pub async fn search_users(&self, query: SearchUsersQuery) -> Result<PaginatedResponse<UserResponse>> {
        let pagination = Pagination::new(query.page, query.limit)?;
        let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

        let (users, total) = self
            .users
            .search(q, pagination.skip(), pagination.limit())
            .await?;

        let data = users.into_iter().map(UserResponse::from).collect();
        Ok(pagination.paginate(total, data))
    }

    /// Looks a user up by id when `identifier` parses as one, by username otherwise.
    pub async fn get_user_detail(&self, identifier: &str) -> Result<UserResponse> {
        let user = match Uuid::parse_str(identifier) {
            Ok(id) => self.users.find_by_id(id).await?,
            Err(_) => self.users.find_by_username(identifier).await?,
        };

        user.map(UserResponse::from)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
