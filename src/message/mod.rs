pub mod mentions;
pub mod message_dto;
pub mod message_handlers;
pub mod message_models;
pub mod message_repository;
pub mod message_service;

pub use message_models::{Message, MessageResponse};
pub use message_repository::{MessageRepository, MessageStore};
pub use message_service::MessageService;
