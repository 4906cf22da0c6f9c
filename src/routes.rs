use crate::{
    conversation::{
        conversation_dto::{
            ConversationMembersRequest, CreateGroupRequest, ReceiversRequest,
            SendToConversationRequest, UpdateConversationRequest,
        },
        conversation_handlers::{self, SeenResponse},
        ConversationResponse, ConversationType,
    },
    error::{ErrorResponse, FieldViolation},
    message::{
        message_dto::{EditMessageRequest, SendMessageRequest},
        message_handlers,
        message_models::{MessageResponse, MessageType},
    },
    middleware::auth_middleware,
    state::AppState,
    user::{
        user_dto::UpdateProfileRequest,
        user_handlers,
        user_models::{UserResponse, UserSummary},
    },
    websocket::types::{
        AckPayload, ConversationRemovedPayload, MembersChangedPayload, SeenPayload, TypingPayload,
    },
};
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::user::user_handlers::get_current_user,
        crate::user::user_handlers::update_current_user,
        crate::user::user_handlers::search_users,
        crate::user::user_handlers::get_user_detail,
        crate::conversation::conversation_handlers::get_my_conversations,
        crate::conversation::conversation_handlers::find_conversation,
        crate::conversation::conversation_handlers::open_conversation,
        crate::conversation::conversation_handlers::get_conversation,
        crate::conversation::conversation_handlers::get_conversation_messages,
        crate::conversation::conversation_handlers::send_to_conversation,
        crate::conversation::conversation_handlers::mark_seen,
        crate::conversation::conversation_handlers::create_group,
        crate::conversation::conversation_handlers::update_conversation,
        crate::conversation::conversation_handlers::add_members,
        crate::conversation::conversation_handlers::remove_members,
        crate::message::message_handlers::send_message,
        crate::message::message_handlers::edit_message,
        crate::message::message_handlers::delete_message,
        crate::websocket::handler::ws_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            FieldViolation,
            UpdateProfileRequest,
            UserResponse,
            UserSummary,
            ReceiversRequest,
            CreateGroupRequest,
            UpdateConversationRequest,
            ConversationMembersRequest,
            SendToConversationRequest,
            ConversationResponse,
            ConversationType,
            SeenResponse,
            SendMessageRequest,
            EditMessageRequest,
            MessageResponse,
            MessageType,
            SeenPayload,
            TypingPayload,
            MembersChangedPayload,
            ConversationRemovedPayload,
            AckPayload,
        )
    ),
    tags(
        (name = "users", description = "User directory and profile endpoints"),
        (name = "conversations", description = "Conversation and group endpoints"),
        (name = "messages", description = "Message send, edit and delete endpoints"),
        (name = "realtime", description = "WebSocket session")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let user_routes = Router::new()
        .route("/", get(user_handlers::search_users))
        .route(
            "/me",
            get(user_handlers::get_current_user).patch(user_handlers::update_current_user),
        )
        .route("/:identifier", get(user_handlers::get_user_detail))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let conversation_routes = Router::new()
        .route("/", post(conversation_handlers::open_conversation))
        .route("/me", get(conversation_handlers::get_my_conversations))
        .route("/find", post(conversation_handlers::find_conversation))
        .route("/groups", post(conversation_handlers::create_group))
        .route(
            "/:id",
            get(conversation_handlers::get_conversation)
                .patch(conversation_handlers::update_conversation),
        )
        .route(
            "/:id/messages",
            get(conversation_handlers::get_conversation_messages)
                .post(conversation_handlers::send_to_conversation),
        )
        .route("/:id/seen", post(conversation_handlers::mark_seen))
        .route("/:id/members", post(conversation_handlers::add_members))
        .route("/:id/members/remove", post(conversation_handlers::remove_members))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let message_routes = Router::new()
        .route("/", post(message_handlers::send_message))
        .route(
            "/:id",
            patch(message_handlers::edit_message).delete(message_handlers::delete_message),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // WebSocket route
    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/conversations", conversation_routes)
        .nest("/messages", message_routes)
        .merge(ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, token_for, MemoryStore};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn call(
        router: Router,
        method: Method,
        uri: &str,
        user_id: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token_for(user_id)));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_requests_without_token_are_unauthorized() {
        let store = MemoryStore::shared();
        let router = create_router(test_state(&store));

        let (status, body) = call(router, Method::GET, "/api/conversations/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "UnauthorizedError");
    }

    #[tokio::test]
    async fn test_token_for_deleted_account_is_unauthorized() {
        let store = MemoryStore::shared();
        let router = create_router(test_state(&store));

        let (status, _) = call(router, Method::GET, "/api/users/me", Some(Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_send_then_list_over_http() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let state = test_state(&store);

        let (status, message) = call(
            create_router(state.clone()),
            Method::POST,
            "/api/messages",
            Some(alice),
            Some(json!({ "receivers": [bob], "content": "hello bob", "type": "text" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["content"], "hello bob");
        assert_eq!(message["sender"]["username"], "alice");

        let (status, page) = call(
            create_router(state.clone()),
            Method::GET,
            "/api/conversations/me",
            Some(bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["totalItems"], 1);
        assert_eq!(page["data"][0]["unread_count"], 1);

        let conversation_id = message["conversation_id"].as_str().unwrap().to_string();
        let (status, messages) = call(
            create_router(state),
            Method::GET,
            &format!("/api/conversations/{}/messages", conversation_id),
            Some(bob),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(messages["data"][0]["content"], "hello bob");
    }

    #[tokio::test]
    async fn test_validation_errors_list_fields() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let router = create_router(test_state(&store));

        let (status, body) = call(
            router,
            Method::POST,
            "/api/messages",
            Some(alice),
            Some(json!({ "receivers": [], "content": "", "type": "text" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "ValidationError");
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["field"].as_str())
            .collect();
        assert_eq!(fields, vec!["content", "receivers"]);
    }

    #[tokio::test]
    async fn test_non_member_cannot_read_messages() {
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

        let (status, body) = call(
            create_router(state.clone()),
            Method::GET,
            &format!("/api/conversations/{}/messages", conversation.id),
            Some(mallory),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NotFoundError");

        let (status, _) = call(
            create_router(state),
            Method::GET,
            &format!("/api/conversations/{}", conversation.id),
            Some(mallory),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_find_returns_null_until_first_message() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let state = test_state(&store);

        let (status, body) = call(
            create_router(state.clone()),
            Method::POST,
            "/api/conversations/find",
            Some(alice),
            Some(json!({ "receivers": [bob] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
        assert_eq!(store.conversation_count(), 0);

        let (status, opened) = call(
            create_router(state.clone()),
            Method::POST,
            "/api/conversations",
            Some(alice),
            Some(json!({ "receivers": [bob] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, found) = call(
            create_router(state),
            Method::POST,
            "/api/conversations/find",
            Some(bob),
            Some(json!({ "receivers": [alice] })),
        )
        .await;
        assert_eq!(found["id"], opened["id"]);
    }

    #[tokio::test]
    async fn test_edit_and_delete_routes() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let state = test_state(&store);

        let (_, message) = call(
            create_router(state.clone()),
            Method::POST,
            "/api/messages",
            Some(alice),
            Some(json!({ "receivers": [bob], "content": "draft", "type": "text" })),
        )
        .await;
        let uri = format!("/api/messages/{}", message["id"].as_str().unwrap());

        let (status, _) = call(
            create_router(state.clone()),
            Method::PATCH,
            &uri,
            Some(bob),
            Some(json!({ "content": "hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, edited) = call(
            create_router(state.clone()),
            Method::PATCH,
            &uri,
            Some(alice),
            Some(json!({ "content": "final" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["content"], "final");

        let (status, deleted) = call(create_router(state), Method::DELETE, &uri, Some(alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(deleted["deleted_at"].is_string());
        assert!(deleted["content"].is_null());
    }

    #[tokio::test]
    async fn test_group_routes() {
        let store = MemoryStore::shared();
        let alice = store.seed_user("alice");
        let bob = store.seed_user("bob");
        let carol = store.seed_user("carol");
        let state = test_state(&store);

        let (status, group) = call(
            create_router(state.clone()),
            Method::POST,
            "/api/conversations/groups",
            Some(alice),
            Some(json!({ "members": [bob], "name": "Weekend" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(group["type"], "group");
        let id = group["id"].as_str().unwrap().to_string();

        let (status, group) = call(
            create_router(state.clone()),
            Method::POST,
            &format!("/api/conversations/{}/members", id),
            Some(bob),
            Some(json!({ "members": [carol] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(group["members"].as_array().unwrap().len(), 3);

        let (status, group) = call(
            create_router(state.clone()),
            Method::PATCH,
            &format!("/api/conversations/{}", id),
            Some(carol),
            Some(json!({ "name": "Long weekend" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(group["name"], "Long weekend");

        let (status, seen) = call(
            create_router(state),
            Method::POST,
            &format!("/api/conversations/{}/seen", id),
            Some(carol),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(seen["seen_at"].is_string());
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let store = MemoryStore::shared();
        let router = create_router(test_state(&store));

        let (status, doc) = call(router, Method::GET, "/api-docs/openapi.json", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/api/messages"].is_object());

        let schemas = &doc["components"]["schemas"];
        for name in ["MessageResponse", "ConversationResponse", "UserResponse"] {
            assert!(schemas[name].is_object(), "missing schema {}", name);
        }
        let sent = &doc["paths"]["/api/messages"]["post"]["responses"]["201"];
        assert_eq!(
            sent["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/MessageResponse"
        );
    }
}
