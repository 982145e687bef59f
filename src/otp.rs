//! One-time payment secrets.
//!
//! A secret is generated at checkout, handed to the caller once, and persisted
//! only as an argon2 PHC string. The payment webhook proves knowledge of the
//! secret by verifying it against that hash.

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use password_hash::rand_core::OsRng;
use rand::{Rng, distributions::Alphanumeric};

use crate::error::{AppError, AppResult};

pub const OTP_LENGTH: usize = 8;

pub fn generate_otp() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(OTP_LENGTH)
        .map(char::from)
        .collect()
}

pub fn hash_otp(otp: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(otp.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

/// Returns `Ok(false)` on mismatch; argon2 compares digests in constant time.
pub fn verify_otp(otp: &str, otp_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(otp_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid payment secret hash")))?;
    Ok(Argon2::default()
        .verify_password(otp.as_bytes(), &parsed)
        .is_ok())
}

/// Hashes on the blocking pool so a slow argon2 run does not stall the runtime.
pub async fn hash_otp_blocking(otp: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_otp(&otp))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

pub async fn verify_otp_blocking(otp: String, otp_hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_otp(&otp, &otp_hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}
