use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
};
use super::{
    connection::{conversation_list_room, conversation_room},
    types::{AckPayload, ClientEvent, ServerEvent},
};

/// Real-time session for conversation rooms and the personal conversation list.
#[utoipa::path(
    get,
    path = "/api/ws",
    tag = "realtime",
    params(
        ("token" = Option<String>, Query, description = "Access token, when no Authorization header can be sent")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let session_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.hub.register_session(session_id, user_id, tx.clone());
    state.hub.join(session_id, &conversation_list_room(user_id));
    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        sessions = state.hub.session_count(),
        "WebSocket connected"
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(event = event.name(), error = %e, "Failed to encode event"),
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let ack = process_client_event(&text, session_id, user_id, &recv_state).await;
                    recv_state.hub.send_to_session(session_id, ServerEvent::Ack(ack));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let heartbeat = Duration::from_secs(state.config.ws_heartbeat_secs.max(1));
    let mut heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat);
        // The first tick fires immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(ServerEvent::Ping).is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
            heartbeat_task.abort();
        },
        _ = &mut heartbeat_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    state.hub.remove_session(session_id);
    tracing::info!(session_id = %session_id, user_id = %user_id, "WebSocket closed");
}

/// Handles one inbound frame and returns the acknowledgement for it.
pub async fn process_client_event(
    text: &str,
    session_id: Uuid,
    user_id: Uuid,
    state: &AppState,
) -> AckPayload {
    let event_name = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| value.get("event").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let outcome = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => apply_client_event(event, session_id, user_id, state).await,
        Err(e) => Err(AppError::bad_request(format!("Invalid event: {}", e))),
    };

    match outcome {
        Ok(()) => AckPayload {
            event: event_name,
            success: true,
            message: None,
        },
        Err(e) => {
            tracing::debug!(
                session_id = %session_id,
                event = %event_name,
                error = %e,
                "Client event rejected"
            );
            AckPayload {
                event: event_name,
                success: false,
                message: Some(e.public_message()),
            }
        }
    }
}

async fn apply_client_event(
    event: ClientEvent,
    session_id: Uuid,
    user_id: Uuid,
    state: &AppState,
) -> Result<()> {
    match event {
        ClientEvent::Join { conversation_id } => {
            state.seen_tracker.mark_entered(conversation_id, user_id).await?;
            state.hub.join(session_id, &conversation_room(conversation_id));
        }

        ClientEvent::Leave { conversation_id } => {
            state.hub.leave(session_id, &conversation_room(conversation_id));
        }

        ClientEvent::Seen { conversation_id } => {
            state.seen_tracker.mark_entered(conversation_id, user_id).await?;
        }

        ClientEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            if !state.hub.is_joined(session_id, &conversation_room(conversation_id)) {
                return Err(AppError::Forbidden(
                    "Join the conversation before sending typing events".to_string(),
                ));
            }
            state
                .notifier
                .notify_typing(session_id, conversation_id, user_id, is_typing);
        }

        ClientEvent::JoinList => {
            state.hub.join(session_id, &conversation_list_room(user_id));
        }

        ClientEvent::Ping => {
            state.hub.send_to_session(session_id, ServerEvent::Pong);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, MemoryStore};
    use serde_json::json;

    struct Connected {
        session_id: Uuid,
        rx: mpsc::UnboundedReceiver<ServerEvent>,
    }

    fn connect(state: &AppState, user_id: Uuid) -> Connected {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.hub.register_session(session_id, user_id, tx);
        state.hub.join(session_id, &conversation_list_room(user_id));
        Connected { session_id, rx }
    }

    async fn send(state: &AppState, session: &Connected, user_id: Uuid, frame: serde_json::Value) -> AckPayload {
        process_client_event(&frame.to_string(), session.session_id, user_id, state).await
    }

    #[tokio::test]
    async fn test_join_marks_entered_and_subscribes() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let state = test_state(&store);
        let conversation = state
            .conversation_service
            .resolve_conversation(alice, &[bob])
            .await
            .unwrap();
        let session = connect(&state, bob);

        let ack = send(
            &state,
            &session,
            bob,
            json!({ "event": "conversation/join", "data": { "conversation_id": conversation.id } }),
        )
        .await;

        assert!(ack.success);
        assert_eq!(ack.event, "conversation/join");
        assert!(state.hub.is_joined(session.session_id, &conversation_room(conversation.id)));
        assert!(store
            .conversation(conversation.id)
            .unwrap()
            .last_entered_by(bob)
            .is_some());
    }

    #[tokio::test]
    async fn test_outsider_cannot_join() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let mallory = store.seed_user("mallory");
        let state = test_state(&store);
        let conversation = state
            .conversation_service
            .resolve_conversation(alice, &[bob])
            .await
            .unwrap();
        let session = connect(&state, mallory);

        let ack = send(
            &state,
            &session,
            mallory,
            json!({ "event": "conversation/join", "data": { "conversation_id": conversation.id } }),
        )
        .await;

        assert!(!ack.success);
        assert!(ack.message.is_some());
        assert!(!state.hub.is_joined(session.session_id, &conversation_room(conversation.id)));
    }

    #[tokio::test]
    async fn test_leave_without_join_is_acknowledged() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let state = test_state(&store);
        let session = connect(&state, alice);

        let ack = send(
            &state,
            &session,
            alice,
            json!({ "event": "conversation/leave", "data": { "conversation_id": Uuid::new_v4() } }),
        )
        .await;

        assert!(ack.success);
    }

    #[tokio::test]
    async fn test_typing_requires_joined_room_and_skips_sender() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let state = test_state(&store);
        let conversation = state
            .conversation_service
            .resolve_conversation(alice, &[bob])
            .await
            .unwrap();
        let mut alice_session = connect(&state, alice);
        let mut bob_session = connect(&state, bob);
        let typing = json!({
            "event": "conversation/typing",
            "data": { "conversation_id": conversation.id, "is_typing": true }
        });

        let ack = send(&state, &alice_session, alice, typing.clone()).await;
        assert!(!ack.success);

        for (session, user) in [(&alice_session, alice), (&bob_session, bob)] {
            let join = json!({ "event": "conversation/join", "data": { "conversation_id": conversation.id } });
            assert!(send(&state, session, user, join).await.success);
        }
        while alice_session.rx.try_recv().is_ok() {}
        while bob_session.rx.try_recv().is_ok() {}

        let ack = send(&state, &alice_session, alice, typing).await;
        assert!(ack.success);
        assert!(matches!(
            bob_session.rx.try_recv(),
            Ok(ServerEvent::Typing(p)) if p.user_id == alice && p.is_typing
        ));
        assert!(alice_session.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_gets_pong_and_garbage_gets_failed_ack() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let state = test_state(&store);
        let mut session = connect(&state, alice);

        let ack = send(&state, &session, alice, json!({ "event": "ping" })).await;
        assert!(ack.success);
        assert!(matches!(session.rx.try_recv(), Ok(ServerEvent::Pong)));

        let ack = process_client_event("not json", session.session_id, alice, &state).await;
        assert!(!ack.success);
        assert_eq!(ack.event, "unknown");

        let ack = send(&state, &session, alice, json!({ "event": "conversation/explode" })).await;
        assert!(!ack.success);
        assert_eq!(ack.event, "conversation/explode");
    }

    #[tokio::test]
    async fn test_list_room_rejoin_is_idempotent() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let state = test_state(&store);
        let session = connect(&state, alice);

        let ack = send(&state, &session, alice, json!({ "event": "conversationList/user" })).await;
        assert!(ack.success);
        assert!(state.hub.is_joined(session.session_id, &conversation_list_room(alice)));
    }
}
