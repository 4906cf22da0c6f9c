use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::ServerEvent;

pub type WsSender = mpsc::UnboundedSender<ServerEvent>;

pub fn conversation_room(conversation_id: Uuid) -> String {
    format!("conversation/{}", conversation_id)
}

pub fn conversation_list_room(user_id: Uuid) -> String {
    format!("conversationList/user/{}", user_id)
}

struct Session {
    user_id: Uuid,
    sender: WsSender,
    rooms: HashSet<String>,
}

/// Live sessions and the named rooms they have joined.
///
/// Delivery is at-most-once: events go to whoever is subscribed at publish
/// time and are never queued for later.
#[derive(Clone, Default)]
pub struct RoomHub {
    sessions: Arc<DashMap<Uuid, Session>>,
    rooms: Arc<DashMap<String, HashSet<Uuid>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_session(&self, session_id: Uuid, user_id: Uuid, sender: WsSender) {
        self.sessions.insert(
            session_id,
            Session {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        tracing::debug!(session_id = %session_id, user_id = %user_id, "Session registered");
    }

    /// Drops the session and its membership in every room.
    pub fn remove_session(&self, session_id: Uuid) {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return;
        };

        for room in &session.rooms {
            self.detach(room, session_id);
        }
        tracing::debug!(session_id = %session_id, user_id = %session.user_id, "Session removed");
    }

    /// Joins a room. Joining twice is a no-op. Returns false for an unknown session.
    pub fn join(&self, session_id: Uuid, room: &str) -> bool {
        // Never hold a session guard while touching `rooms`.
        match self.sessions.get_mut(&session_id) {
            Some(mut session) => {
                session.rooms.insert(room.to_string());
            }
            None => return false,
        }

        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(session_id);
        self.keep_if_live(room, session_id)
    }

    /// A `remove_session` that ran between the session update and the room
    /// insert has already cleaned up, so the room entry is ours to drop.
    fn keep_if_live(&self, room: &str, session_id: Uuid) -> bool {
        if self.sessions.contains_key(&session_id) {
            return true;
        }
        self.detach(room, session_id);
        false
    }

    /// Leaves a room. Leaving a room that was never joined is a no-op.
    pub fn leave(&self, session_id: Uuid, room: &str) {
        if let Some(mut session) = self.sessions.get_mut(&session_id) {
            session.rooms.remove(room);
        }
        self.detach(room, session_id);
    }

    /// Removes every session of `user_id` from `room`.
    pub fn leave_user(&self, user_id: Uuid, room: &str) {
        let session_ids: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| *entry.key())
            .collect();

        for session_id in session_ids {
            self.leave(session_id, room);
        }
    }

    pub fn is_joined(&self, session_id: Uuid, room: &str) -> bool {
        self.sessions
            .get(&session_id)
            .map(|session| session.rooms.contains(room))
            .unwrap_or(false)
    }

    /// Sends `event` to one session.
    pub fn send_to_session(&self, session_id: Uuid, event: ServerEvent) -> bool {
        match self.sessions.get(&session_id) {
            Some(session) => session.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Sends `event` to every session in `room`. Returns how many sessions took it.
    pub fn publish(&self, room: &str, event: ServerEvent) -> usize {
        self.deliver(room, None, event)
    }

    /// Like [`publish`](Self::publish) but skips `except`.
    pub fn publish_except(&self, room: &str, except: Uuid, event: ServerEvent) -> usize {
        self.deliver(room, Some(except), event)
    }

    fn deliver(&self, room: &str, except: Option<Uuid>, event: ServerEvent) -> usize {
        let targets: Vec<Uuid> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|id| Some(*id) != except)
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for session_id in targets {
            let sent = self
                .sessions
                .get(&session_id)
                .map(|session| session.sender.send(event.clone()).is_ok())
                .unwrap_or(false);

            if sent {
                delivered += 1;
            } else {
                tracing::warn!(
                    room = room,
                    session_id = %session_id,
                    event = event.name(),
                    "Failed to deliver event"
                );
            }
        }

        delivered
    }

    fn detach(&self, room: &str, session_id: Uuid) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&session_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
