use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    notification::Notifier,
};
use super::conversation_repository::ConversationStore;

/// A message is unread for `viewer` when someone else sent it after the
/// viewer last entered. Without an entry time everything from others is unread.
#[cfg(test)]
pub fn is_unread(message: &crate::message::Message, viewer: Uuid, last_entered: Option<DateTime<Utc>>) -> bool {
    if message.sender_id == viewer || message.is_deleted() {
        return false;
    }

    match last_entered {
        Some(at) => message.created_at > at,
        None => true,
    }
}

/// Records when members view a conversation and tells the room about it.
#[derive(Clone)]
pub struct SeenTracker {
    conversations: Arc<dyn ConversationStore>,
    notifier: Notifier,
}

impl SeenTracker {
    pub fn new(conversations: Arc<dyn ConversationStore>, notifier: Notifier) -> Self {
        Self {
            conversations,
            notifier,
        }
    }

    pub async fn mark_entered(&self, conversation_id: Uuid, user_id: Uuid) -> Result<DateTime<Utc>> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if !conversation.has_member(user_id) {
            return Err(AppError::Forbidden(
                "You are not a member of this conversation".to_string(),
            ));
        }

        let seen_at = Utc::now();
        // Only this member's entry is written.
        let updated = self
            .conversations
            .set_last_entered(conversation_id, user_id, seen_at)
            .await?;
        if !updated {
            return Err(AppError::Forbidden(
                "You are not a member of this conversation".to_string(),
            ));
        }

        self.notifier.notify_seen(conversation_id, user_id, seen_at);
        Ok(seen_at)
    }
}
