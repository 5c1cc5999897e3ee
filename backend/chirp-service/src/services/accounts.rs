//! Registration and login

use chrono::{DateTime, Utc};
use crypto_core::jwt::{TokenIssuer, TokenResponse};
use crypto_core::{password, AuthError};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};
use validator::Validate;

use crate::db::{ContentStore, NewUser};
use crate::error::{AppError, Result};
use crate::models::User;

pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MAX_BIO_LENGTH: usize = 300;

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("Invalid username regex"));

/// Usernames must be mentionable, so they use the same charset as `@mentions`
pub(crate) fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_REGEX.is_match(username) {
        return Err(AppError::Validation(
            "username: may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email, length(max = 150))]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(max = 300))]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

pub struct AccountService {
    store: Arc<dyn ContentStore>,
    issuer: Arc<TokenIssuer>,
}

impl AccountService {
    pub fn new(store: Arc<dyn ContentStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    pub async fn register(&self, req: RegisterRequest, now: DateTime<Utc>) -> Result<User> {
        let req = RegisterRequest {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_string(),
            bio: req.bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
            password: req.password,
        };
        req.validate()?;
        validate_username(&req.username)?;

        let password = req.password;
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))??;

        let user = self
            .store
            .create_user(&NewUser {
                username: req.username,
                email: req.email,
                password_hash,
                bio: req.bio,
                created_at: now,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Exchange email and password for an access token
    ///
    /// Unknown email and wrong password produce the same 401.
    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse> {
        req.validate()
            .map_err(|_| AppError::from(AuthError::InvalidCredentials))?;

        let user = match self.store.user_by_email(req.email.trim()).await? {
            Some(user) => user,
            None => {
                warn!("Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let hash = user.password_hash.clone();
        let password = req.password;
        tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("password verification task failed: {}", e)))?
            .map_err(|e| {
                warn!(user_id = user.id, "Login rejected");
                AppError::from(e)
            })?;

        let token = self.issuer.issue(user.id, &user.username)?;
        info!(user_id = user.id, "User logged in");
        Ok(token)
    }
}
