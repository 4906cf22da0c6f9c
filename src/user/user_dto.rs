use serde::Deserialize;
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be between 3 and 32 characters"))]
    pub username: String,
    /// Anything besides `username` is collected here and rejected.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchUsersQuery {
    /// Case-insensitive match on username or email
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}
