use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{error::Result, middleware::AuthUser, pagination::PageQuery, state::AppState};
use super::conversation_dto::{
    ConversationListQuery, ConversationMembersRequest, CreateGroupRequest, ReceiversRequest,
    SendToConversationRequest, UpdateConversationRequest,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct SeenResponse {
    pub seen_at: DateTime<Utc>,
}

/// List conversations the current user belongs to
#[utoipa::path(
    get,
    path = "/api/conversations/me",
    tag = "conversations",
    params(ConversationListQuery),
    responses(
        (status = 200, description = "Paginated conversations, most recently active first", body = PaginatedResponse<ConversationResponse>),
        (status = 400, description = "Invalid filter or pagination"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_my_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ConversationListQuery>,
) -> Result<impl IntoResponse> {
    let conversations = state
        .conversation_service
        .list_my_conversations(user_id, query)
        .await?;

    Ok((StatusCode::OK, Json(conversations)))
}

/// Find the conversation with exactly these receivers, without creating it
#[utoipa::path(
    post,
    path = "/api/conversations/find",
    tag = "conversations",
    request_body = ReceiversRequest,
    responses(
        (status = 200, description = "The conversation, or null when none exists", body = ConversationResponse),
        (status = 400, description = "Invalid receivers"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn find_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ReceiversRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .find_by_receivers(user_id, &payload.receivers)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}

/// Open the conversation with these receivers, creating it if needed
#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    request_body = ReceiversRequest,
    responses(
        (status = 200, description = "Conversation resolved", body = ConversationResponse),
        (status = 400, description = "Invalid receivers"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Receiver not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn open_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ReceiversRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .open_conversation(user_id, &payload.receivers)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}

/// Get a conversation by id
#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation found", body = ConversationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let conversation = state
        .conversation_service
        .get_conversation(user_id, id)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}

/// List messages of a conversation, newest first
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Paginated messages", body = PaginatedResponse<MessageResponse>),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let messages = state
        .message_service
        .list_messages(user_id, id, query)
        .await?;

    Ok((StatusCode::OK, Json(messages)))
}

/// Send a message to an existing conversation
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendToConversationRequest,
    responses(
        (status = 201, description = "Message sent", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_to_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendToConversationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let message = state
        .message_service
        .send_to_conversation(user_id, id, payload.content, &payload.message_type)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Mark a conversation as seen by the current user
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/seen",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Entry time recorded", body = SeenResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_seen(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let seen_at = state.seen_tracker.mark_entered(id, user_id).await?;

    Ok((StatusCode::OK, Json(SeenResponse { seen_at })))
}

/// Create a group conversation
#[utoipa::path(
    post,
    path = "/api/conversations/groups",
    tag = "conversations",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = ConversationResponse),
        (status = 400, description = "Invalid members"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Member not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .create_group(user_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Update a group's name or thumbnail
#[utoipa::path(
    patch,
    path = "/api/conversations/{id}",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = UpdateConversationRequest,
    responses(
        (status = 200, description = "Conversation updated", body = ConversationResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member, or an individual conversation"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateConversationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .update_details(user_id, id, payload)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}

/// Add members to a group
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/members",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = ConversationMembersRequest,
    responses(
        (status = 200, description = "Members added", body = ConversationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member, or an individual conversation"),
        (status = 404, description = "Conversation or user not found"),
        (status = 409, description = "Everyone listed is already a member")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn add_members(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConversationMembersRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .add_members(user_id, id, &payload.members)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}

/// Remove members from a group
///
/// Returns null when the group was emptied and deleted.
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/members/remove",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = ConversationMembersRequest,
    responses(
        (status = 200, description = "Members removed", body = ConversationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not a member, or an individual conversation"),
        (status = 404, description = "Conversation not found, or none of the users are members")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn remove_members(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConversationMembersRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .remove_members(user_id, id, &payload.members)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}
