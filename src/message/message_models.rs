use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    Audio,
    Video,
    Emoji,
}

impl MessageType {
    /// Only plain text can be edited after sending.
    pub fn is_editable(&self) -> bool {
        matches!(self, MessageType::Text)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::Audio => "audio",
            MessageType::Video => "video",
            MessageType::Emoji => "emoji",
        };
        f.write_str(name)
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            "audio" => Ok(MessageType::Audio),
            "video" => Ok(MessageType::Video),
            "emoji" => Ok(MessageType::Emoji),
            _ => Err(
                "Invalid message type, must be text, image, file, audio, video or emoji".to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub tagged_users: Vec<Uuid>,
    pub replies: Vec<Uuid>,
    pub level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Message accepted by the pipeline, written together with its conversation update.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub tagged_users: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        tagged_users: Vec<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            message_type,
            tagged_users,
            created_at: Utc::now(),
        }
    }

    #[cfg(test)]
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            message_type: self.message_type,
            tagged_users: self.tagged_users,
            replies: Vec::new(),
            level: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
            deleted_at: None,
        }
    }
}

/// Message with sender and tagged users resolved. Content is withheld once deleted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserSummary,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub tagged_users: Vec<UserSummary>,
    pub replies: Vec<Uuid>,
    pub level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MessageResponse {
    pub fn new(message: Message, sender: UserSummary, tagged_users: Vec<UserSummary>) -> Self {
        let content = if message.is_deleted() {
            None
        } else {
            Some(message.content)
        };

        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender,
            content,
            message_type: message.message_type,
            tagged_users,
            replies: message.replies,
            level: message.level,
            created_at: message.created_at,
            updated_at: message.updated_at,
            deleted_at: message.deleted_at,
        }
    }
}
