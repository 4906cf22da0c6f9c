use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{conversation::ConversationResponse, message::MessageResponse, user::UserSummary};

/// Server-to-client frames, `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "conversation/newMessage")]
    NewMessage(MessageResponse),
    #[serde(rename = "conversation/messageUpdated")]
    MessageUpdated(MessageResponse),
    #[serde(rename = "conversation/messageDeleted")]
    MessageDeleted(MessageResponse),
    #[serde(rename = "conversation/seen")]
    Seen(SeenPayload),
    #[serde(rename = "conversation/typing")]
    Typing(TypingPayload),
    #[serde(rename = "conversation/updated")]
    ConversationUpdated(ConversationResponse),
    #[serde(rename = "conversation/membersAdded")]
    MembersAdded(MembersChangedPayload),
    #[serde(rename = "conversation/membersRemoved")]
    MembersRemoved(MembersChangedPayload),

    #[serde(rename = "conversationList/newConversation")]
    ListNewConversation(ConversationResponse),
    #[serde(rename = "conversationList/newMessage")]
    ListNewMessage(ConversationMessagePayload),
    #[serde(rename = "conversationList/lastMessageChanged")]
    ListLastMessageChanged(ConversationMessagePayload),
    #[serde(rename = "conversationList/lastMessageDeleted")]
    ListLastMessageDeleted(ConversationMessagePayload),
    #[serde(rename = "conversationList/conversationRemoved")]
    ListConversationRemoved(ConversationRemovedPayload),

    #[serde(rename = "ack")]
    Ack(AckPayload),
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "conversation/newMessage",
            ServerEvent::MessageUpdated(_) => "conversation/messageUpdated",
            ServerEvent::MessageDeleted(_) => "conversation/messageDeleted",
            ServerEvent::Seen(_) => "conversation/seen",
            ServerEvent::Typing(_) => "conversation/typing",
            ServerEvent::ConversationUpdated(_) => "conversation/updated",
            ServerEvent::MembersAdded(_) => "conversation/membersAdded",
            ServerEvent::MembersRemoved(_) => "conversation/membersRemoved",
            ServerEvent::ListNewConversation(_) => "conversationList/newConversation",
            ServerEvent::ListNewMessage(_) => "conversationList/newMessage",
            ServerEvent::ListLastMessageChanged(_) => "conversationList/lastMessageChanged",
            ServerEvent::ListLastMessageDeleted(_) => "conversationList/lastMessageDeleted",
            ServerEvent::ListConversationRemoved(_) => "conversationList/conversationRemoved",
            ServerEvent::Ack(_) => "ack",
            ServerEvent::Ping => "ping",
            ServerEvent::Pong => "pong",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeenPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TypingPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MembersChangedPayload {
    pub conversation_id: Uuid,
    pub members: Vec<UserSummary>,
    pub changed_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessagePayload {
    pub conversation_id: Uuid,
    pub message: MessageResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationRemovedPayload {
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AckPayload {
    pub event: String,
    pub success: bool,
    pub message: Option<String>,
}

// Client-to-server frames
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "conversation/join")]
    Join { conversation_id: Uuid },
    #[serde(rename = "conversation/leave")]
    Leave { conversation_id: Uuid },
    #[serde(rename = "conversation/seen")]
    Seen { conversation_id: Uuid },
    #[serde(rename = "conversation/typing")]
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },
    #[serde(rename = "conversationList/user")]
    JoinList,
    #[serde(rename = "ping")]
    Ping,
}
