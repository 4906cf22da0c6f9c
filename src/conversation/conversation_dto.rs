use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ConversationListQuery {
    /// Matches the conversation name or any member's username/email
    pub q: Option<String>,
    /// individual, group or channel
    #[serde(rename = "type")]
    pub conversation_type: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReceiversRequest {
    #[validate(length(min = 1, message = "At least one receiver is required"))]
    pub receivers: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, message = "At least one member is required"))]
    pub members: Vec<Uuid>,
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateConversationRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ConversationMembersRequest {
    #[validate(length(min = 1, message = "At least one member is required"))]
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendToConversationRequest {
    #[validate(length(min = 1, message = "Message content is required"))]
    pub content: String,
    /// One of text, image, file, audio, video, emoji
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Message type is required"))]
    pub message_type: String,
}
