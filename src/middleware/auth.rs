use crate::{auth::verify_jwt, error::AppError, state::AppState};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Bearer token from the Authorization header, or the `token` query
/// parameter for clients that cannot set headers (WebSockets).
fn request_token(req: &Request<Body>) -> Result<&str, AppError> {
    if let Some(header) = req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        return header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()));
    }

    req.uri()
        .query()
        .unwrap_or("")
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = verify_jwt(request_token(&req)?, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    // Tokens outlive accounts.
    state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}

// Extractor for getting user_id from request extensions
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Uuid>()
            .copied()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_token_from_header_or_query() {
        let req = request("/api/users/me", Some("Bearer abc"));
        assert_eq!(request_token(&req).unwrap(), "abc");

        let req = request("/api/ws?foo=1&token=xyz", None);
        assert_eq!(request_token(&req).unwrap(), "xyz");
    }

    #[test]
    fn test_missing_or_malformed_token_is_unauthorized() {
        assert!(matches!(
            request_token(&request("/api/users/me", None)),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            request_token(&request("/api/users/me", Some("Basic abc"))),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            request_token(&request("/api/ws?token=", None)),
            Err(AppError::Unauthorized(_))
        ));
    }
}
