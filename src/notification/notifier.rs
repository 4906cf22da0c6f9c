use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    conversation::{Conversation, ConversationResponse},
    message::MessageResponse,
    user::UserSummary,
    websocket::{
        connection::{conversation_list_room, conversation_room, RoomHub},
        types::{
            ConversationMessagePayload, ConversationRemovedPayload, MembersChangedPayload,
            SeenPayload, ServerEvent, TypingPayload,
        },
    },
};

/// Fans domain events out to conversation rooms and members' list rooms.
///
/// Every call is fire-and-forget. It must only be made after the write it
/// describes has committed.
#[derive(Clone)]
pub struct Notifier {
    hub: RoomHub,
}

impl Notifier {
    pub fn new(hub: RoomHub) -> Self {
        Self { hub }
    }

    /// New message in a conversation. Members' lists get the whole
    /// conversation when the message created it, the message otherwise.
    pub fn notify_new_message(
        &self,
        conversation: &ConversationResponse,
        message: &MessageResponse,
        is_new_conversation: bool,
    ) {
        let delivered = self.hub.publish(
            &conversation_room(conversation.id),
            ServerEvent::NewMessage(message.clone()),
        );

        for member in &conversation.members {
            let event = if is_new_conversation {
                ServerEvent::ListNewConversation(conversation.clone())
            } else {
                ServerEvent::ListNewMessage(ConversationMessagePayload {
                    conversation_id: conversation.id,
                    message: message.clone(),
                })
            };
            self.hub.publish(&conversation_list_room(member.id), event);
        }

        tracing::debug!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            is_new_conversation,
            delivered,
            "New message published"
        );
    }

    pub fn notify_message_updated(&self, conversation: &Conversation, message: &MessageResponse) {
        self.hub.publish(
            &conversation_room(conversation.id),
            ServerEvent::MessageUpdated(message.clone()),
        );

        if conversation.last_message_id == Some(message.id) {
            self.to_members(conversation, |conversation_id| {
                ServerEvent::ListLastMessageChanged(ConversationMessagePayload {
                    conversation_id,
                    message: message.clone(),
                })
            });
        }
    }

    pub fn notify_message_deleted(&self, conversation: &Conversation, message: &MessageResponse) {
        self.hub.publish(
            &conversation_room(conversation.id),
            ServerEvent::MessageDeleted(message.clone()),
        );

        if conversation.last_message_id == Some(message.id) {
            self.to_members(conversation, |conversation_id| {
                ServerEvent::ListLastMessageDeleted(ConversationMessagePayload {
                    conversation_id,
                    message: message.clone(),
                })
            });
        }
    }

    pub fn notify_seen(&self, conversation_id: Uuid, user_id: Uuid, seen_at: DateTime<Utc>) {
        self.hub.publish(
            &conversation_room(conversation_id),
            ServerEvent::Seen(SeenPayload {
                conversation_id,
                user_id,
                seen_at,
            }),
        );
    }

    /// Relays a typing indicator to everyone in the room except the typing session.
    pub fn notify_typing(&self, session_id: Uuid, conversation_id: Uuid, user_id: Uuid, is_typing: bool) {
        self.hub.publish_except(
            &conversation_room(conversation_id),
            session_id,
            ServerEvent::Typing(TypingPayload {
                conversation_id,
                user_id,
                is_typing,
            }),
        );
    }

    /// Explicitly created conversation, announced on every member's list.
    pub fn notify_conversation_created(&self, conversation: &ConversationResponse) {
        for member in &conversation.members {
            self.hub.publish(
                &conversation_list_room(member.id),
                ServerEvent::ListNewConversation(conversation.clone()),
            );
        }
    }

    pub fn notify_conversation_updated(&self, conversation: &ConversationResponse) {
        self.hub.publish(
            &conversation_room(conversation.id),
            ServerEvent::ConversationUpdated(conversation.clone()),
        );
    }

    pub fn notify_members_added(
        &self,
        conversation: &ConversationResponse,
        added: Vec<UserSummary>,
        added_by: Uuid,
    ) {
        for member in &added {
            self.hub.publish(
                &conversation_list_room(member.id),
                ServerEvent::ListNewConversation(conversation.clone()),
            );
        }

        self.hub.publish(
            &conversation_room(conversation.id),
            ServerEvent::MembersAdded(MembersChangedPayload {
                conversation_id: conversation.id,
                members: added,
                changed_by: added_by,
            }),
        );
    }

    /// Removed members lose the conversation room and see it leave their list.
    pub fn notify_members_removed(
        &self,
        conversation_id: Uuid,
        removed: Vec<UserSummary>,
        removed_by: Uuid,
    ) {
        let room = conversation_room(conversation_id);

        for member in &removed {
            self.hub.leave_user(member.id, &room);
            self.hub.publish(
                &conversation_list_room(member.id),
                ServerEvent::ListConversationRemoved(ConversationRemovedPayload { conversation_id }),
            );
        }

        self.hub.publish(
            &room,
            ServerEvent::MembersRemoved(MembersChangedPayload {
                conversation_id,
                members: removed,
                changed_by: removed_by,
            }),
        );
    }

    fn to_members(&self, conversation: &Conversation, event: impl Fn(Uuid) -> ServerEvent) {
        for member in &conversation.members {
            self.hub
                .publish(&conversation_list_room(*member), event(conversation.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conversation::{conversation_models::NewConversation, ConversationType},
        message::message_models::{MessageType, NewMessage},
    };
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn listen(hub: &RoomHub, user_id: Uuid, room: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        hub.register_session(session_id, user_id, tx);
        hub.join(session_id, room);
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    fn fixture() -> (Conversation, ConversationResponse, MessageResponse) {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let conversation =
            NewConversation::started_by(alice, vec![bob, alice], ConversationType::Individual)
                .into_conversation();
        let message = NewMessage::new(conversation.id, alice, "hi".into(), MessageType::Text, vec![])
            .into_message();
        let message = MessageResponse::new(message, UserSummary::unknown(alice), vec![]);

        let response = ConversationResponse {
            id: conversation.id,
            conversation_type: conversation.conversation_type,
            name: None,
            thumbnail: None,
            members: conversation.members.iter().map(|id| UserSummary::unknown(*id)).collect(),
            last_message: Some(message.clone()),
            last_time_enter_chat: HashMap::new(),
            unread_count: None,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        };
        (conversation, response, message)
    }

    #[test]
    fn test_new_message_fans_out_to_room_and_every_list() {
        let hub = RoomHub::new();
        let notifier = Notifier::new(hub.clone());
        let (conversation, response, message) = fixture();
        let [bob, alice] = [conversation.members[0], conversation.members[1]];

        let mut room = listen(&hub, alice, &conversation_room(conversation.id));
        let mut alice_list = listen(&hub, alice, &conversation_list_room(alice));
        let mut bob_list = listen(&hub, bob, &conversation_list_room(bob));

        notifier.notify_new_message(&response, &message, true);
        assert_eq!(drain(&mut room), vec!["conversation/newMessage"]);
        assert_eq!(drain(&mut alice_list), vec!["conversationList/newConversation"]);
        assert_eq!(drain(&mut bob_list), vec!["conversationList/newConversation"]);

        notifier.notify_new_message(&response, &message, false);
        assert_eq!(drain(&mut bob_list), vec!["conversationList/newMessage"]);
    }

    #[test]
    fn test_edit_of_older_message_skips_lists() {
        let hub = RoomHub::new();
        let notifier = Notifier::new(hub.clone());
        let (mut conversation, _, message) = fixture();
        let bob = conversation.members[0];
        let mut room = listen(&hub, bob, &conversation_room(conversation.id));
        let mut bob_list = listen(&hub, bob, &conversation_list_room(bob));

        conversation.last_message_id = Some(Uuid::new_v4());
        notifier.notify_message_updated(&conversation, &message);
        assert_eq!(drain(&mut room), vec!["conversation/messageUpdated"]);
        assert!(drain(&mut bob_list).is_empty());

        conversation.last_message_id = Some(message.id);
        notifier.notify_message_deleted(&conversation, &message);
        assert_eq!(drain(&mut room), vec!["conversation/messageDeleted"]);
        assert_eq!(drain(&mut bob_list), vec!["conversationList/lastMessageDeleted"]);
    }

    #[test]
    fn test_removed_member_is_evicted_from_room() {
        let hub = RoomHub::new();
        let notifier = Notifier::new(hub.clone());
        let conversation_id = Uuid::new_v4();
        let carol = Uuid::new_v4();
        let dave = Uuid::new_v4();
        let mut carol_room = listen(&hub, carol, &conversation_room(conversation_id));
        let mut carol_list = listen(&hub, carol, &conversation_list_room(carol));
        let mut dave_room = listen(&hub, dave, &conversation_room(conversation_id));

        notifier.notify_members_removed(conversation_id, vec![UserSummary::unknown(carol)], dave);

        assert!(drain(&mut carol_room).is_empty());
        assert_eq!(drain(&mut carol_list), vec!["conversationList/conversationRemoved"]);
        assert_eq!(drain(&mut dave_room), vec!["conversation/membersRemoved"]);
    }
}
