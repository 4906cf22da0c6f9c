//! In-memory stores and wiring for service and router tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    conversation::{
        conversation_models::{ConversationFilter, NewConversation},
        seen_tracker::is_unread,
        Conversation, ConversationService, ConversationStore, ConversationType, SeenTracker,
    },
    error::{AppError, Result},
    message::{message_models::NewMessage, Message, MessageService, MessageStore},
    state::{AppState, Config},
    user::{user_models::User, UserDirectory, UserService, UserSummary},
    websocket::RoomHub,
};

pub const TEST_SECRET: &str = "test-secret";

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

/// Implements every store trait over shared vectors. `persist` behaves as
/// one unit: a failure leaves no trace of the message or a new conversation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_conversation_update: AtomicBool,
    summaries_down: AtomicBool,
    unread_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_user(&self, username: &str) -> Uuid {
        self.seed_user_with_id(username, Uuid::new_v4())
    }

    pub fn seed_user_with_id(&self, username: &str, id: Uuid) -> Uuid {
        let now = Utc::now();
        self.inner.lock().unwrap().users.push(User {
            id,
            username: Some(username.to_string()),
            email: format!("{}@example.com", username),
            avatar: None,
            is_verified: true,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Makes the next `persist` fail at the conversation update, after the
    /// message has been staged.
    pub fn fail_next_conversation_update(&self) {
        self.fail_conversation_update.store(true, Ordering::SeqCst);
    }

    /// Number of unread-count queries served so far.
    pub fn unread_queries(&self) -> usize {
        self.unread_queries.load(Ordering::SeqCst)
    }

    /// While set, every user summary lookup fails.
    pub fn set_summaries_down(&self, down: bool) {
        self.summaries_down.store(down, Ordering::SeqCst);
    }

    pub fn conversation(&self, id: Uuid) -> Option<Conversation> {
        let inner = self.inner.lock().unwrap();
        inner.conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn message(&self, id: Uuid) -> Option<Message> {
        let inner = self.inner.lock().unwrap();
        inner.messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn conversation_count(&self) -> usize {
        self.inner.lock().unwrap().conversations.len()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Newest first; among equal timestamps the later insert comes first.
fn newest_first<T: Clone>(items: &[T], at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut sorted: Vec<T> = items.iter().rev().cloned().collect();
    sorted.sort_by_key(|item| Reverse(at(item)));
    sorted
}

fn window<T>(items: Vec<T>, skip: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(skip as usize)
        .take(limit as usize)
        .collect()
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        if self.summaries_down.load(Ordering::SeqCst) {
            return Err(AppError::Dependency("user directory unavailable".to_string()));
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(UserSummary::from)
            .collect())
    }

    async fn count_existing(&self, ids: &[Uuid]) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().filter(|u| ids.contains(&u.id)).count() as i64)
    }

    async fn search(&self, query: Option<&str>, skip: i64, limit: i64) -> Result<(Vec<User>, i64)> {
        let inner = self.inner.lock().unwrap();
        let matches: Vec<User> = inner
            .users
            .iter()
            .filter(|u| match query {
                Some(q) => {
                    u.username.as_deref().map(|name| contains_ci(name, q)).unwrap_or(false)
                        || contains_ci(&u.email, q)
                }
                None => true,
            })
            .cloned()
            .collect();

        let total = matches.len() as i64;
        let sorted = newest_first(&matches, |u| u.created_at);
        Ok((window(sorted, skip, limit), total))
    }

    async fn username_taken(&self, username: &str, except: Uuid) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .any(|u| u.id != except && u.username.as_deref() == Some(username)))
    }

    async fn update_username(&self, user_id: Uuid, username: &str) -> Result<Option<User>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.users.iter_mut().find(|u| u.id == user_id).map(|user| {
            user.username = Some(username.to_string());
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

fn missing_conversation() -> AppError {
    AppError::NotFound("Conversation not found".to_string())
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_by_id(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.conversation(conversation_id))
    }

    async fn find_by_members(
        &self,
        members: &[Uuid],
        conversation_type: ConversationType,
    ) -> Result<Option<Conversation>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .conversations
            .iter()
            .find(|c| {
                c.conversation_type == conversation_type
                    && c.members.len() == members.len()
                    && members.iter().all(|m| c.members.contains(m))
            })
            .cloned())
    }

    async fn list_for_member(
        &self,
        user_id: Uuid,
        filter: &ConversationFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Conversation>, i64)> {
        let inner = self.inner.lock().unwrap();
        let member_matches = |c: &Conversation, q: &str| {
            inner.users.iter().any(|u| {
                c.members.contains(&u.id)
                    && (u.username.as_deref().map(|name| contains_ci(name, q)).unwrap_or(false)
                        || contains_ci(&u.email, q))
            })
        };

        let matches: Vec<Conversation> = inner
            .conversations
            .iter()
            .filter(|c| c.has_member(user_id))
            .filter(|c| {
                filter
                    .conversation_type
                    .map(|t| c.conversation_type == t)
                    .unwrap_or(true)
            })
            .filter(|c| match filter.query.as_deref() {
                Some(q) => {
                    c.name.as_deref().map(|name| contains_ci(name, q)).unwrap_or(false)
                        || member_matches(c, q)
                }
                None => true,
            })
            .cloned()
            .collect();

        let total = matches.len() as i64;
        let sorted = newest_first(&matches, |c| c.updated_at);
        Ok((window(sorted, skip, limit), total))
    }

    async fn create(&self, conversation: NewConversation) -> Result<Conversation> {
        let conversation = conversation.into_conversation();
        self.inner
            .lock()
            .unwrap()
            .conversations
            .push(conversation.clone());
        Ok(conversation)
    }

    async fn update_details(
        &self,
        conversation_id: Uuid,
        name: Option<String>,
        thumbnail: Option<String>,
    ) -> Result<Conversation> {
        let mut inner = self.inner.lock().unwrap();
        let conversation = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(missing_conversation)?;

        if name.is_some() {
            conversation.name = name;
        }
        if thumbnail.is_some() {
            conversation.thumbnail = thumbnail;
        }
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn add_members(&self, conversation_id: Uuid, members: &[Uuid]) -> Result<Conversation> {
        let mut inner = self.inner.lock().unwrap();
        let conversation = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(missing_conversation)?;

        for member in members {
            if !conversation.members.contains(member) {
                conversation.members.push(*member);
            }
        }
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    async fn remove_members(
        &self,
        conversation_id: Uuid,
        members: &[Uuid],
    ) -> Result<Option<Conversation>> {
        let mut inner = self.inner.lock().unwrap();
        let conversation = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(missing_conversation)?;

        conversation.members.retain(|m| !members.contains(m));
        for member in members {
            conversation.last_time_enter_chat.remove(member);
        }
        conversation.updated_at = Utc::now();

        if conversation.members.is_empty() && conversation.conversation_type == ConversationType::Group {
            inner.conversations.retain(|c| c.id != conversation_id);
            inner.messages.retain(|m| m.conversation_id != conversation_id);
            return Ok(None);
        }

        Ok(Some(conversation.clone()))
    }

    async fn set_last_entered(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id && c.has_member(user_id))
        {
            Some(conversation) => {
                conversation.last_time_enter_chat.insert(user_id, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn persist(
        &self,
        new_conversation: Option<NewConversation>,
        message: NewMessage,
    ) -> Result<(Conversation, Message)> {
        let mut inner = self.inner.lock().unwrap();
        let created = new_conversation.map(NewConversation::into_conversation);

        if let Some(conversation) = &created {
            inner.conversations.push(conversation.clone());
        }
        let message = message.into_message();
        inner.messages.push(message.clone());

        if self.fail_conversation_update.swap(false, Ordering::SeqCst) {
            inner.messages.retain(|m| m.id != message.id);
            if let Some(conversation) = &created {
                inner.conversations.retain(|c| c.id != conversation.id);
            }
            return Err(AppError::Dependency(
                "conversation update failed".to_string(),
            ));
        }

        let Some(index) = inner
            .conversations
            .iter()
            .position(|c| c.id == message.conversation_id)
        else {
            inner.messages.retain(|m| m.id != message.id);
            return Err(missing_conversation());
        };

        let conversation = &mut inner.conversations[index];
        conversation.last_message_id = Some(message.id);
        conversation.updated_at = message.created_at;
        Ok((conversation.clone(), message))
    }

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>> {
        Ok(self.message(message_id))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Message>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: Uuid,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Message>, i64)> {
        let inner = self.inner.lock().unwrap();
        let matches: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();

        let total = matches.len() as i64;
        let sorted = newest_first(&matches, |m| m.created_at);
        Ok((window(sorted, skip, limit), total))
    }

    async fn update_content(
        &self,
        message_id: Uuid,
        content: &str,
        tagged_users: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && !m.is_deleted())
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        message.content = content.to_string();
        message.tagged_users = tagged_users.to_vec();
        message.updated_at = at;
        Ok(message.clone())
    }

    async fn soft_delete(&self, message_id: Uuid, at: DateTime<Utc>) -> Result<Message> {
        let mut inner = self.inner.lock().unwrap();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && !m.is_deleted())
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        message.deleted_at = Some(at);
        Ok(message.clone())
    }

    async fn count_unread_many(
        &self,
        viewer: Uuid,
        conversation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>> {
        self.unread_queries.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        let mut counts = HashMap::new();
        for conversation in inner
            .conversations
            .iter()
            .filter(|c| conversation_ids.contains(&c.id))
        {
            let since = conversation.last_entered_by(viewer);
            let count = inner
                .messages
                .iter()
                .filter(|m| m.conversation_id == conversation.id && is_unread(m, viewer, since))
                .count() as i64;
            if count > 0 {
                counts.insert(conversation.id, count);
            }
        }
        Ok(counts)
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgresql://localhost/chat_test".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        database_max_connections: 1,
        cors_origins: vec!["http://localhost:3000".to_string()],
        ws_heartbeat_secs: 30,
    }
}

pub fn test_state(store: &Arc<MemoryStore>) -> AppState {
    AppState::new(test_config(), store.clone(), store.clone(), store.clone())
}

/// Services of one [`AppState`], for tests that call them directly.
pub struct TestServices {
    pub state: AppState,
    pub hub: RoomHub,
    pub users: UserService,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub seen: SeenTracker,
}

pub fn test_services(store: &Arc<MemoryStore>) -> TestServices {
    let state = test_state(store);
    TestServices {
        hub: state.hub.clone(),
        users: state.user_service.clone(),
        conversations: state.conversation_service.clone(),
        messages: state.message_service.clone(),
        seen: state.seen_tracker.clone(),
        state,
    }
}

/// Bearer token for `user_id`, signed with [`TEST_SECRET`].
pub fn token_for(user_id: Uuid) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = crate::auth::jwt::Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_SECRET.as_bytes())).unwrap()
}
