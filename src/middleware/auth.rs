use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

/// JWT payload; `exp` is seconds since the epoch.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenClaims {
    pub sub: Uuid,
    pub role: String,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, ROLE_ADMIN)
}

/// Resolves the caller from a `Bearer` JWT signed with the configured secret.
pub fn authenticate(auth_header: Option<&str>, secret: &str) -> Result<AuthUser, AppError> {
    let auth_str =
        auth_header.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;

    let claims = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?
    .claims;

    Ok(AuthUser {
        user_id: claims.sub,
        role: claims.role,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|value| {
                value
                    .to_str()
                    .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))
            })
            .transpose()?;

        authenticate(auth_header, &state.config.jwt_secret)
    }
}
