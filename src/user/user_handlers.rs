use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use crate::{error::Result, middleware::AuthUser, state::AppState};
use super::user_dto::{SearchUsersQuery, UpdateProfileRequest};

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 200, description = "User profile retrieved successfully", body = UserResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let user = state.user_service.get_current_user(user_id).await?;

    Ok((StatusCode::OK, Json(user)))
}

/// Update current user profile (username only)
#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated successfully", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Username already taken")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let user = state
        .user_service
        .update_current_user(user_id, payload)
        .await?;

    Ok((StatusCode::OK, Json(user)))
}

/// Search users by username or email
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    params(SearchUsersQuery),
    responses(
        (status = 200, description = "Paginated users", body = PaginatedResponse<UserResponse>),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn search_users(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Query(query): Query<SearchUsersQuery>,
) -> Result<impl IntoResponse> {
    let users = state.user_service.search_users(query).await?;

    Ok((StatusCode::OK, Json(users)))
}

/// Get a user by id or username
#[utoipa::path(
    get,
    path = "/api/users/{identifier}",
    tag = "users",
    params(
        ("identifier" = String, Path, description = "User ID or username")
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_user_detail(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(identifier): Path<String>,
) -> Result<impl IntoResponse> {
    let user = state.user_service.get_user_detail(&identifier).await?;

    Ok((StatusCode::OK, Json(user)))
}
