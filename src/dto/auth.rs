use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::User;

/// New accounts always get the `user` role; admins are seeded.
#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    /// Stored trimmed and lowercased.
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(min_length = 6)]
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Ready to send as the `Authorization` header value.
    #[schema(example = "Bearer eyJhbGciOiJIUzI1NiJ9...")]
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}
