use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest},
    error::{AppError, AppResult},
    middleware::auth::{ROLE_USER, TokenClaims},
    models::User,
    response::ApiResponse,
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            email: record.email,
            role: record.role,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

pub(crate) async fn find_user_by_id(pool: &DbPool, id: Uuid) -> AppResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub(crate) async fn hash_password_blocking(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

pub(crate) async fn verify_password_blocking(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Signs an HS256 token; `sub` is the user id.
pub fn issue_token(user_id: Uuid, role: &str, secret: &str, ttl_hours: i64) -> AppResult<String> {
    sign_token(user_id, role, secret, token_expiry(ttl_hours)?)
}

fn token_expiry(ttl_hours: i64) -> AppResult<DateTime<Utc>> {
    Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))
}

fn sign_token(
    user_id: Uuid,
    role: &str,
    secret: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<String> {
    let claims = TokenClaims {
        sub: user_id,
        role: role.to_string(),
        exp: expires_at.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("a valid email is required".into()));
    }
    validate_password(&payload.password)?;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let password_hash = hash_password_blocking(payload.password).await?;

    let user = sqlx::query_as::<_, UserRecord>(
        "INSERT INTO users (id, name, email, password_hash, role) VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(name.as_str())
    .bind(email.as_str())
    .bind(password_hash)
    .bind(ROLE_USER)
    .fetch_one(&state.pool)
    .await
    .map_err(|err| match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => {
            AppError::BadRequest("Email is already taken".to_string())
        }
        _ => AppError::from(err),
    })?;

    tracing::info!(user_id = %user.id, "user registered");
    audit::record(
        &state.pool,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("User created", User::from(user), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = payload.email.trim().to_lowercase();
    let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let expires_at = token_expiry(state.config.jwt_ttl_hours)?;
    let token = sign_token(user.id, &user.role, &state.config.jwt_secret, expires_at)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token: format!("Bearer {token}"),
            expires_at,
            user: User::from(user),
        },
        None,
    ))
}
