use anyhow::Context;
use std::sync::Arc;

use crate::{
    conversation::{ConversationService, ConversationStore, SeenTracker},
    message::{MessageService, MessageStore},
    notification::Notifier,
    population::Populator,
    user::{UserDirectory, UserService},
    websocket::RoomHub,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserDirectory>,
    pub hub: RoomHub,
    pub notifier: Notifier,
    pub user_service: UserService,
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub seen_tracker: SeenTracker,
}

impl AppState {
    /// Wires every service over the given stores. One hub serves all of them.
    pub fn new(
        config: Config,
        users: Arc<dyn UserDirectory>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let hub = RoomHub::new();
        let notifier = Notifier::new(hub.clone());
        let populator = Populator::new(users.clone(), messages.clone());

        let conversation_service = ConversationService::new(
            conversations.clone(),
            users.clone(),
            populator.clone(),
            notifier.clone(),
        );
        let message_service = MessageService::new(
            messages,
            users.clone(),
            conversation_service.clone(),
            populator,
            notifier.clone(),
        );

        Self {
            config: Arc::new(config),
            user_service: UserService::new(users.clone()),
            seen_tracker: SeenTracker::new(conversations, notifier.clone()),
            notifier,
            users,
            hub,
            conversation_service,
            message_service,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub database_max_connections: u32,
    pub cors_origins: Vec<String>,
    pub ws_heartbeat_secs: u64,
}

fn var_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: var_or("PORT", 3000)?,
            database_max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10)?,
            cors_origins,
            ws_heartbeat_secs: var_or("WS_HEARTBEAT_SECS", 30)?,
        })
    }

    /// Database URL with the password replaced, for logging.
    pub fn redacted_database_url(&self) -> String {
        match (self.database_url.find("://"), self.database_url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let credentials = &self.database_url[scheme_end + 3..at];
                match credentials.find(':') {
                    Some(colon) => format!(
                        "{}{}:****{}",
                        &self.database_url[..scheme_end + 3],
                        &credentials[..colon],
                        &self.database_url[at..]
                    ),
                    None => self.database_url.clone(),
                }
            }
            _ => self.database_url.clone(),
        }
    }
}
