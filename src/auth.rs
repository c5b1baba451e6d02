use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::AppError;

const TOKEN_LEN: usize = 64;
const SESSION_ID_LEN: usize = 48;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);
    let hash = SaltString::encode_b64(&salt_bytes)
        .and_then(|salt| {
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .map_err(|err: password_hash::Error| AppError::Database(err.to_string()))?;
    Ok(hash)
}

/// `false` for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A bearer token for API access.
pub fn generate_token() -> String {
    random_alphanumeric(TOKEN_LEN)
}

pub fn generate_session_id() -> String {
    random_alphanumeric(SESSION_ID_LEN)
}
