pub mod conversation_dto;
pub mod conversation_handlers;
pub mod conversation_models;
pub mod conversation_repository;
pub mod conversation_service;
pub mod seen_tracker;

pub use conversation_models::{Conversation, ConversationResponse, ConversationType};
pub use conversation_repository::{ConversationRepository, ConversationStore};
pub use conversation_service::{ConversationService, ResolvedConversation};
pub use seen_tracker::SeenTracker;
