use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    conversation::{Conversation, ConversationResponse},
    error::{AppError, Result},
    message::{Message, MessageResponse, MessageStore},
    user::{UserDirectory, UserSummary},
};

/// Resolves stored references (senders, tagged users, members, last message)
/// into display records. Every read path calls it explicitly, one batched
/// user lookup per call.
#[derive(Clone)]
pub struct Populator {
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
}

impl Populator {
    pub fn new(users: Arc<dyn UserDirectory>, messages: Arc<dyn MessageStore>) -> Self {
        Self { users, messages }
    }

    async fn summaries(&self, ids: Vec<Uuid>) -> Result<HashMap<Uuid, UserSummary>> {
        let mut ids = ids;
        ids.sort();
        ids.dedup();

        Ok(self
            .users
            .find_summaries(&ids)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect())
    }

    fn lookup(users: &HashMap<Uuid, UserSummary>, id: Uuid) -> UserSummary {
        users.get(&id).cloned().unwrap_or_else(|| UserSummary::unknown(id))
    }

    fn present(users: &HashMap<Uuid, UserSummary>, message: Message) -> MessageResponse {
        let sender = Self::lookup(users, message.sender_id);
        let tagged_users = message
            .tagged_users
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect();
        MessageResponse::new(message, sender, tagged_users)
    }

    pub async fn messages(&self, messages: Vec<Message>) -> Result<Vec<MessageResponse>> {
        let ids = messages
            .iter()
            .flat_map(|m| std::iter::once(m.sender_id).chain(m.tagged_users.iter().copied()))
            .collect();
        let users = self.summaries(ids).await?;

        Ok(messages
            .into_iter()
            .map(|message| Self::present(&users, message))
            .collect())
    }

    pub async fn message(&self, message: Message) -> Result<MessageResponse> {
        let ids = std::iter::once(message.sender_id)
            .chain(message.tagged_users.iter().copied())
            .collect();
        let users = self.summaries(ids).await?;

        Ok(Self::present(&users, message))
    }

    /// Populates conversations. With a `viewer`, each entry also carries the
    /// viewer's unread count.
    pub async fn conversations(
        &self,
        conversations: Vec<Conversation>,
        viewer: Option<Uuid>,
    ) -> Result<Vec<ConversationResponse>> {
        let last_ids: Vec<Uuid> = conversations
            .iter()
            .filter_map(|c| c.last_message_id)
            .collect();
        let last_messages: HashMap<Uuid, Message> = self
            .messages
            .find_by_ids(&last_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let ids = conversations
            .iter()
            .flat_map(|c| c.members.iter().copied())
            .chain(last_messages.values().flat_map(|m| {
                std::iter::once(m.sender_id).chain(m.tagged_users.iter().copied())
            }))
            .collect();
        let users = self.summaries(ids).await?;

        let unread = match viewer {
            Some(viewer) => {
                let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
                Some(self.messages.count_unread_many(viewer, &ids).await?)
            }
            None => None,
        };

        let mut responses = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let unread_count = unread
                .as_ref()
                .map(|counts| counts.get(&conversation.id).copied().unwrap_or(0));

            let last_message = conversation
                .last_message_id
                .and_then(|id| last_messages.get(&id).cloned())
                .map(|m| Self::present(&users, m));

            responses.push(ConversationResponse {
                id: conversation.id,
                conversation_type: conversation.conversation_type,
                name: conversation.name,
                thumbnail: conversation.thumbnail,
                members: conversation
                    .members
                    .iter()
                    .map(|id| Self::lookup(&users, *id))
                    .collect(),
                last_message,
                last_time_enter_chat: conversation.last_time_enter_chat,
                unread_count,
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
            });
        }

        Ok(responses)
    }

    pub async fn conversation(&self, conversation: Conversation) -> Result<ConversationResponse> {
        self.conversations(vec![conversation], None)
            .await?
            .pop()
            .ok_or_else(|| AppError::Dependency("conversation lost during population".to_string()))
    }

    /// Display records for `ids`, in the given order.
    pub async fn users(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        let users = self.summaries(ids.to_vec()).await?;
        Ok(ids.iter().map(|id| Self::lookup(&users, *id)).collect())
    }
}
