use crate::{
    conversation::{Conversation, ConversationService, ResolvedConversation},
    error::{AppError, Result},
    notification::Notifier,
    pagination::{PageQuery, PaginatedResponse, Pagination},
    population::Populator,
    user::{UserDirectory, UserSummary},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use super::{
    mentions::extract_mention_ids,
    message_dto::{EditMessageRequest, SendMessageRequest},
    message_models::{Message, MessageResponse, MessageType, NewMessage},
    message_repository::MessageStore,
};

fn parse_type(message_type: &str) -> Result<MessageType> {
    message_type
        .parse::<MessageType>()
        .map_err(|e| AppError::invalid_field("type", e))
}

fn require_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::invalid_field("content", "Message content is required"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    conversations: ConversationService,
    populator: Populator,
    notifier: Notifier,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn UserDirectory>,
        conversations: ConversationService,
        populator: Populator,
        notifier: Notifier,
    ) -> Self {
        Self {
            messages,
            users,
            conversations,
            populator,
            notifier,
        }
    }

    /// Mentioned ids that belong to existing users, in mention order.
    async fn resolve_mentions(&self, content: &str) -> Result<Vec<Uuid>> {
        let ids = extract_mention_ids(content);
        if ids.is_empty() {
            return Ok(ids);
        }

        let found: Vec<Uuid> = self
            .users
            .find_summaries(&ids)
            .await?
            .into_iter()
            .map(|user| user.id)
            .collect();

        Ok(ids.into_iter().filter(|id| found.contains(id)).collect())
    }

    /// Sends to the conversation of exactly `receivers` plus the sender,
    /// creating it in the same atomic unit when it does not exist yet.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        payload: SendMessageRequest,
    ) -> Result<MessageResponse> {
        require_content(&payload.content)?;
        let message_type = parse_type(&payload.message_type)?;

        let target = self
            .conversations
            .plan_conversation(sender_id, &payload.receivers)
            .await?;

        self.deliver(sender_id, target, payload.content, message_type)
            .await
    }

    pub async fn send_to_conversation(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        content: String,
        message_type: &str,
    ) -> Result<MessageResponse> {
        require_content(&content)?;
        let message_type = parse_type(message_type)?;

        let conversation = self
            .conversations
            .member_conversation(sender_id, conversation_id)
            .await?;

        self.deliver(
            sender_id,
            ResolvedConversation::Existing(conversation),
            content,
            message_type,
        )
        .await
    }

    /// Display form of a message whose write already committed. When the
    /// users cannot be resolved the caller still gets the stored message,
    /// with an unknown sender and no tags, and the flag says not to publish.
    async fn committed_response(&self, message: Message) -> (MessageResponse, bool) {
        let message_id = message.id;
        let sender_id = message.sender_id;
        match self.populator.message(message.clone()).await {
            Ok(response) => (response, true),
            Err(e) => {
                tracing::warn!(
                    message_id = %message_id,
                    error = %e,
                    "Message stored but not populated"
                );
                (
                    MessageResponse::new(message, UserSummary::unknown(sender_id), Vec::new()),
                    false,
                )
            }
        }
    }

    /// Persists the message, then fans it out. Nothing is published unless
    /// the write committed.
    async fn deliver(
        &self,
        sender_id: Uuid,
        target: ResolvedConversation,
        content: String,
        message_type: MessageType,
    ) -> Result<MessageResponse> {
        let conversation_id = target.id();
        let new_conversation = match target {
            ResolvedConversation::Existing(conversation) => {
                if !conversation.has_member(sender_id) {
                    return Err(AppError::Forbidden(
                        "You are not a member of this conversation".to_string(),
                    ));
                }
                None
            }
            ResolvedConversation::New(planned) => Some(planned),
        };
        let is_new_conversation = new_conversation.is_some();

        let tagged_users = self.resolve_mentions(&content).await?;
        let message = NewMessage::new(conversation_id, sender_id, content, message_type, tagged_users);

        let (conversation, message) = self.messages.persist(new_conversation, message).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            sender_id = %sender_id,
            is_new_conversation,
            "Message sent"
        );

        let (message, populated) = self.committed_response(message).await;
        if !populated {
            return Ok(message);
        }
        match self.populator.conversation(conversation).await {
            Ok(conversation) => {
                self.notifier
                    .notify_new_message(&conversation, &message, is_new_conversation)
            }
            Err(e) => tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                "Message stored but not published"
            ),
        }

        Ok(message)
    }

    /// Message plus its conversation, provided `user_id` belongs to that conversation.
    async fn member_message(&self, user_id: Uuid, message_id: Uuid) -> Result<(Message, Conversation)> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        let conversation = self
            .conversations
            .member_conversation(user_id, message.conversation_id)
            .await?;

        Ok((message, conversation))
    }

    /// Edits a text message. Sending identical content changes nothing and
    /// publishes nothing.
    pub async fn edit_message(
        &self,
        editor_id: Uuid,
        message_id: Uuid,
        payload: EditMessageRequest,
    ) -> Result<MessageResponse> {
        require_content(&payload.content)?;
        let (message, conversation) = self.member_message(editor_id, message_id).await?;

        if message.sender_id != editor_id {
            return Err(AppError::Forbidden("You can only edit your own messages".to_string()));
        }
        if message.is_deleted() {
            return Err(AppError::Forbidden("Deleted messages cannot be edited".to_string()));
        }
        if !message.message_type.is_editable() {
            return Err(AppError::Forbidden("Only text messages can be edited".to_string()));
        }

        if message.content == payload.content {
            return self.populator.message(message).await;
        }

        let tagged_users = self.resolve_mentions(&payload.content).await?;
        let message = self
            .messages
            .update_content(message_id, &payload.content, &tagged_users, Utc::now())
            .await?;
        tracing::info!(message_id = %message_id, "Message edited");

        let (message, populated) = self.committed_response(message).await;
        if populated {
            self.notifier.notify_message_updated(&conversation, &message);
        }
        Ok(message)
    }

    pub async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<MessageResponse> {
        let (message, conversation) = self.member_message(user_id, message_id).await?;

        if message.sender_id != user_id {
            return Err(AppError::Forbidden("You can only delete your own messages".to_string()));
        }
        if message.is_deleted() {
            return Err(AppError::Forbidden("Message is already deleted".to_string()));
        }

        let message = self.messages.soft_delete(message_id, Utc::now()).await?;
        tracing::info!(message_id = %message_id, "Message deleted");

        let (message, populated) = self.committed_response(message).await;
        if populated {
            self.notifier.notify_message_deleted(&conversation, &message);
        }
        Ok(message)
    }

    /// Newest first. Conversations the user is not in are reported as not found.
    pub async fn list_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        query: PageQuery,
    ) -> Result<PaginatedResponse<MessageResponse>> {
        let pagination = Pagination::from_query(&query)?;
        self.conversations
            .visible_conversation(user_id, conversation_id)
            .await?;

        let (messages, total) = self
            .messages
            .list_for_conversation(conversation_id, pagination.skip(), pagination.limit())
            .await?;

        let data = self.populator.messages(messages).await?;
        Ok(pagination.paginate(total, data))
    }
}
