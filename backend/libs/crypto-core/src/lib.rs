//! Shared authentication primitives for Chirp services.
//!
//! - `password`: Argon2id hashing and verification
//! - `jwt`: HS256 access token issuing and validation

pub mod jwt;
pub mod password;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("password must be at least {} characters and contain a letter and a digit", password::MIN_PASSWORD_LENGTH)]
    WeakPassword,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token encoding failed: {0}")]
    Token(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}
