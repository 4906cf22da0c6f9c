use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, message = "At least one receiver is required"))]
    pub receivers: Vec<Uuid>,
    #[validate(length(min = 1, message = "Message content is required"))]
    pub content: String,
    /// One of text, image, file, audio, video, emoji
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Message type is required"))]
    pub message_type: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, message = "Message content is required"))]
    pub content: String,
}
