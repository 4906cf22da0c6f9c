use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{message::message_models::MessageResponse, user::UserSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Individual,
    Group,
    Channel,
}

impl ConversationType {
    /// Type a find-or-create lookup uses for a member set of the given size.
    pub fn for_member_count(count: usize) -> Self {
        if count == 2 {
            ConversationType::Individual
        } else {
            ConversationType::Group
        }
    }

    /// Whether members can be added/removed and details edited.
    pub fn is_mutable(&self) -> bool {
        !matches!(self, ConversationType::Individual)
    }
}

impl std::fmt::Display for ConversationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationType::Individual => write!(f, "individual"),
            ConversationType::Group => write!(f, "group"),
            ConversationType::Channel => write!(f, "channel"),
        }
    }
}

impl FromStr for ConversationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual" => Ok(ConversationType::Individual),
            "group" => Ok(ConversationType::Group),
            "channel" => Ok(ConversationType::Channel),
            other => Err(format!(
                "Invalid conversation type '{}', must be individual, group or channel",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub conversation_type: ConversationType,
    /// Ordered, duplicate-free member list.
    pub members: Vec<Uuid>,
    pub name: Option<String>,
    pub thumbnail: Option<String>,
    pub last_message_id: Option<Uuid>,
    /// When each member last viewed the conversation. Missing means never.
    pub last_time_enter_chat: HashMap<Uuid, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }

    #[cfg(test)]
    pub fn last_entered_by(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.last_time_enter_chat.get(&user_id).copied()
    }
}

/// A conversation that has been planned but not written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub id: Uuid,
    pub conversation_type: ConversationType,
    pub members: Vec<Uuid>,
    pub name: Option<String>,
    pub thumbnail: Option<String>,
    pub last_time_enter_chat: HashMap<Uuid, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewConversation {
    /// Conversation created on behalf of `requester`, who counts as having
    /// entered it at creation time.
    pub fn started_by(
        requester: Uuid,
        members: Vec<Uuid>,
        conversation_type: ConversationType,
    ) -> Self {
        let now = Utc::now();
        let mut last_time_enter_chat = HashMap::new();
        last_time_enter_chat.insert(requester, now);

        Self {
            id: Uuid::new_v4(),
            conversation_type,
            members,
            name: None,
            thumbnail: None,
            last_time_enter_chat,
            created_at: now,
        }
    }

    #[cfg(test)]
    pub fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.id,
            conversation_type: self.conversation_type,
            members: self.members,
            name: self.name,
            thumbnail: self.thumbnail,
            last_message_id: None,
            last_time_enter_chat: self.last_time_enter_chat,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Filters for listing a member's conversations.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub query: Option<String>,
    pub conversation_type: Option<ConversationType>,
}

/// Conversation with members and last message resolved for display.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub name: Option<String>,
    pub thumbnail: Option<String>,
    pub members: Vec<UserSummary>,
    pub last_message: Option<MessageResponse>,
    pub last_time_enter_chat: HashMap<Uuid, DateTime<Utc>>,
    /// Unread messages for the requesting member; omitted outside list views.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_from_member_count() {
        assert_eq!(ConversationType::for_member_count(2), ConversationType::Individual);
        assert_eq!(ConversationType::for_member_count(3), ConversationType::Group);
        assert_eq!(ConversationType::for_member_count(12), ConversationType::Group);
    }

    #[test]
    fn test_type_round_trips_through_text() {
        for ty in [ConversationType::Individual, ConversationType::Group, ConversationType::Channel] {
            assert_eq!(ty.to_string().parse::<ConversationType>().unwrap(), ty);
        }
        assert!("direct".parse::<ConversationType>().is_err());
    }

    #[test]
    fn test_new_conversation_marks_requester_entered() {
        let requester = Uuid::new_v4();
        let peer = Uuid::new_v4();
        let new = NewConversation::started_by(
            requester,
            vec![peer, requester],
            ConversationType::Individual,
        );

        let conversation = new.into_conversation();
        assert!(conversation.has_member(requester));
        assert!(conversation.last_entered_by(requester).is_some());
        assert!(conversation.last_entered_by(peer).is_none());
        assert!(conversation.last_message_id.is_none());
    }
}
