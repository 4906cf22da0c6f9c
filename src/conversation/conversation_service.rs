use crate::{
    error::{AppError, Result},
    notification::Notifier,
    pagination::{PaginatedResponse, Pagination},
    population::Populator,
    user::UserDirectory,
};
use std::sync::Arc;
use uuid::Uuid;
use super::{
    conversation_dto::{
        ConversationListQuery, CreateGroupRequest, UpdateConversationRequest,
    },
    conversation_models::{
        Conversation, ConversationFilter, ConversationResponse, ConversationType, NewConversation,
    },
    conversation_repository::ConversationStore,
};

/// Outcome of a find-or-create lookup before anything has been written.
#[derive(Debug, Clone)]
pub enum ResolvedConversation {
    Existing(Conversation),
    New(NewConversation),
}

impl ResolvedConversation {
    pub fn id(&self) -> Uuid {
        match self {
            ResolvedConversation::Existing(conversation) => conversation.id,
            ResolvedConversation::New(conversation) => conversation.id,
        }
    }
}

/// Full member set and derived type for a requester messaging `receivers`.
pub fn plan_members(requester: Uuid, receivers: &[Uuid]) -> Result<(Vec<Uuid>, ConversationType)> {
    if receivers.contains(&requester) {
        return Err(AppError::invalid_field(
            "receivers",
            "You cannot send a message to yourself",
        ));
    }

    let mut members: Vec<Uuid> = Vec::with_capacity(receivers.len() + 1);
    for receiver in receivers {
        if !members.contains(receiver) {
            members.push(*receiver);
        }
    }

    if members.is_empty() {
        return Err(AppError::invalid_field(
            "receivers",
            "At least one receiver is required",
        ));
    }

    members.push(requester);
    let conversation_type = ConversationType::for_member_count(members.len());
    Ok((members, conversation_type))
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    unique
}

#[derive(Clone)]
pub struct ConversationService {
    conversations: Arc<dyn ConversationStore>,
    users: Arc<dyn UserDirectory>,
    populator: Populator,
    notifier: Notifier,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        users: Arc<dyn UserDirectory>,
        populator: Populator,
        notifier: Notifier,
    ) -> Self {
        Self {
            conversations,
            users,
            populator,
            notifier,
        }
    }

    /// Finds the conversation for exactly `receivers` plus the requester, or
    /// plans a new one without writing it.
    pub async fn plan_conversation(
        &self,
        requester: Uuid,
        receivers: &[Uuid],
    ) -> Result<ResolvedConversation> {
        let (members, conversation_type) = plan_members(requester, receivers)?;

        if let Some(conversation) = self
            .conversations
            .find_by_members(&members, conversation_type)
            .await?
        {
            return Ok(ResolvedConversation::Existing(conversation));
        }

        let existing = self.users.count_existing(&members).await?;
        if existing != members.len() as i64 {
            return Err(AppError::NotFound("One or more receivers not found".to_string()));
        }

        Ok(ResolvedConversation::New(NewConversation::started_by(
            requester,
            members,
            conversation_type,
        )))
    }

    /// Find-or-create. Creating is silent: nothing is broadcast until a
    /// message is sent.
    pub async fn resolve_conversation(
        &self,
        requester: Uuid,
        receivers: &[Uuid],
    ) -> Result<Conversation> {
        match self.plan_conversation(requester, receivers).await? {
            ResolvedConversation::Existing(conversation) => Ok(conversation),
            ResolvedConversation::New(planned) => {
                let conversation = self.conversations.create(planned).await?;
                tracing::info!(
                    conversation_id = %conversation.id,
                    conversation_type = %conversation.conversation_type,
                    "Conversation created"
                );
                Ok(conversation)
            }
        }
    }

    pub async fn open_conversation(
        &self,
        requester: Uuid,
        receivers: &[Uuid],
    ) -> Result<ConversationResponse> {
        let conversation = self.resolve_conversation(requester, receivers).await?;
        self.populator.conversation(conversation).await
    }

    /// Lookup only; never creates.
    pub async fn find_by_receivers(
        &self,
        requester: Uuid,
        receivers: &[Uuid],
    ) -> Result<Option<ConversationResponse>> {
        let (members, conversation_type) = plan_members(requester, receivers)?;

        match self
            .conversations
            .find_by_members(&members, conversation_type)
            .await?
        {
            Some(conversation) => Ok(Some(self.populator.conversation(conversation).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_my_conversations(
        &self,
        user_id: Uuid,
        query: ConversationListQuery,
    ) -> Result<PaginatedResponse<ConversationResponse>> {
        let pagination = Pagination::new(query.page, query.limit)?;
        let conversation_type = query
            .conversation_type
            .as_deref()
            .map(|t| t.parse::<ConversationType>())
            .transpose()
            .map_err(|e| AppError::invalid_field("type", e))?;
        let filter = ConversationFilter {
            query: query
                .q
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            conversation_type,
        };

        let (conversations, total) = self
            .conversations
            .list_for_member(user_id, &filter, pagination.skip(), pagination.limit())
            .await?;

        let data = self
            .populator
            .conversations(conversations, Some(user_id))
            .await?;
        Ok(pagination.paginate(total, data))
    }

    /// The conversation, provided `user_id` belongs to it.
    pub async fn member_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
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

        Ok(conversation)
    }

    /// Like [`member_conversation`](Self::member_conversation) but reports
    /// non-membership as not found.
    pub async fn visible_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        match self.member_conversation(user_id, conversation_id).await {
            Err(AppError::Forbidden(_)) => {
                Err(AppError::NotFound("Conversation not found".to_string()))
            }
            other => other,
        }
    }

    pub async fn get_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<ConversationResponse> {
        let conversation = self.member_conversation(user_id, conversation_id).await?;

        self.populator
            .conversations(vec![conversation], Some(user_id))
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }

    pub async fn create_group(
        &self,
        requester: Uuid,
        payload: CreateGroupRequest,
    ) -> Result<ConversationResponse> {
        let members = dedup(&payload.members);
        if members.len() != payload.members.len() {
            return Err(AppError::invalid_field("members", "Members must not contain duplicates"));
        }
        if members.contains(&requester) {
            return Err(AppError::invalid_field(
                "members",
                "The creator is added automatically and must not be listed",
            ));
        }
        if self.users.count_existing(&members).await? != members.len() as i64 {
            return Err(AppError::NotFound("One or more members not found".to_string()));
        }

        let mut all_members = members;
        all_members.push(requester);

        let mut planned = NewConversation::started_by(requester, all_members, ConversationType::Group);
        planned.name = payload.name;
        planned.thumbnail = payload.thumbnail;

        let conversation = self.conversations.create(planned).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            created_by = %requester,
            members = conversation.members.len(),
            "Group created"
        );

        let response = self.populator.conversation(conversation).await?;
        self.notifier.notify_conversation_created(&response);
        Ok(response)
    }

    async fn mutable_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        let conversation = self.member_conversation(user_id, conversation_id).await?;

        if !conversation.conversation_type.is_mutable() {
            return Err(AppError::Forbidden(
                "Individual conversations cannot be changed".to_string(),
            ));
        }

        Ok(conversation)
    }

    pub async fn update_details(
        &self,
        requester: Uuid,
        conversation_id: Uuid,
        payload: UpdateConversationRequest,
    ) -> Result<ConversationResponse> {
        if payload.name.is_none() && payload.thumbnail.is_none() {
            return Err(AppError::bad_request("Nothing to update"));
        }

        self.mutable_conversation(requester, conversation_id).await?;

        let conversation = self
            .conversations
            .update_details(conversation_id, payload.name, payload.thumbnail)
            .await?;

        let response = self.populator.conversation(conversation).await?;
        self.notifier.notify_conversation_updated(&response);
        Ok(response)
    }

    pub async fn add_members(
        &self,
        requester: Uuid,
        conversation_id: Uuid,
        members: &[Uuid],
    ) -> Result<ConversationResponse> {
        let conversation = self.mutable_conversation(requester, conversation_id).await?;

        let added: Vec<Uuid> = dedup(members)
            .into_iter()
            .filter(|id| !conversation.has_member(*id))
            .collect();
        if added.is_empty() {
            return Err(AppError::Conflict("All users are already members".to_string()));
        }
        if self.users.count_existing(&added).await? != added.len() as i64 {
            return Err(AppError::NotFound("One or more members not found".to_string()));
        }

        let conversation = self.conversations.add_members(conversation_id, &added).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            added_by = %requester,
            added = added.len(),
            "Members added"
        );

        let response = self.populator.conversation(conversation).await?;
        let added = self.populator.users(&added).await?;
        self.notifier.notify_members_added(&response, added, requester);
        Ok(response)
    }

    /// Returns `None` when the group was deleted because it became empty.
    pub async fn remove_members(
        &self,
        requester: Uuid,
        conversation_id: Uuid,
        members: &[Uuid],
    ) -> Result<Option<ConversationResponse>> {
        let conversation = self.mutable_conversation(requester, conversation_id).await?;

        let removed: Vec<Uuid> = dedup(members)
            .into_iter()
            .filter(|id| conversation.has_member(*id))
            .collect();
        if removed.is_empty() {
            return Err(AppError::NotFound("None of the users are members".to_string()));
        }

        let remaining = self
            .conversations
            .remove_members(conversation_id, &removed)
            .await?;
        tracing::info!(
            conversation_id = %conversation_id,
            removed_by = %requester,
            removed = removed.len(),
            deleted = remaining.is_none(),
            "Members removed"
        );

        let removed = self.populator.users(&removed).await?;
        self.notifier
            .notify_members_removed(conversation_id, removed, requester);

        match remaining {
            Some(conversation) => Ok(Some(self.populator.conversation(conversation).await?)),
            None => Ok(None),
        }
    }
}
