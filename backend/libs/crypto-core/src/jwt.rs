//! JWT issuing and validation for Chirp services
//!
//! Tokens are signed with HS256 using a shared secret loaded from
//! configuration. A `TokenIssuer` owns both keys; services build one at
//! startup and share it behind an `Arc`.
//!
//! ## Usage
//!
//! ```rust
//! use crypto_core::jwt::TokenIssuer;
//!
//! let issuer = TokenIssuer::new("a-long-random-secret", 3600);
//! let token = issuer.issue(42, "alice").unwrap();
//! let claims = issuer.validate(&token.access_token).unwrap();
//! assert_eq!(claims.user_id().unwrap(), 42);
//! ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Only HS256 is accepted; tokens declaring any other algorithm are rejected.
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

const ACCESS_TOKEN_TYPE: &str = "access";

// ============================================================================
// Data Structures
// ============================================================================

/// JWT claims carried by Chirp access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (numeric user id rendered as a string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type, always "access" for now
    pub token_type: String,
    pub username: String,
}

impl Claims {
    /// Parse the subject back into a user id
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

/// Token response returned to clients after login
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

// ============================================================================
// Issuer
// ============================================================================

/// Signs and validates access tokens
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue an access token for a user
    pub fn issue(&self, user_id: i64, username: &str) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let expiry = now + Duration::seconds(self.ttl_secs);

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expiry.timestamp(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            username: username.to_string(),
        };

        let access_token = encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Token(e.to_string()))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_secs,
        })
    }

    /// Validate a token (without the "Bearer " prefix) and return its claims
    ///
    /// Fails on bad signatures, expired tokens, other algorithms and
    /// non-access token types.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-for-unit-tests-only";

    #[test]
    fn test_issue_and_validate() {
        let issuer = TokenIssuer::new(TEST_SECRET, 3600);
        let token = issuer.issue(7, "alice").expect("issue token");

        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.access_token.matches('.').count(), 2);

        let claims = issuer.validate(&token.access_token).expect("valid token");
        assert_eq!(claims.user_id().unwrap(), 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.token_type, "access");
    }

    #[test]
    fn test_reject_token_from_other_secret() {
        let issuer = TokenIssuer::new(TEST_SECRET, 3600);
        let other = TokenIssuer::new("some-other-secret", 3600);
        let token = other.issue(7, "alice").unwrap();

        assert!(matches!(
            issuer.validate(&token.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_reject_tampered_token() {
        let issuer = TokenIssuer::new(TEST_SECRET, 3600);
        let token = issuer.issue(7, "alice").unwrap().access_token;

        let forged_payload = {
            use base64::Engine as _;
            let claims = Claims {
                sub: "1".to_string(),
                iat: 0,
                exp: i64::MAX / 2,
                token_type: "access".to_string(),
                username: "mallory".to_string(),
            };
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(serde_json::to_vec(&claims).unwrap())
        };
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        let forged = parts.join(".");

        assert!(issuer.validate(&forged).is_err());
    }

    #[test]
    fn test_expired_token() {
        let issuer = TokenIssuer::new(TEST_SECRET, -120);
        let token = issuer.issue(7, "alice").unwrap();

        assert!(matches!(
            issuer.validate(&token.access_token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_garbage_token() {
        let issuer = TokenIssuer::new(TEST_SECRET, 3600);
        assert!(issuer.validate("not-a-jwt").is_err());
        assert!(issuer.validate("").is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let issuer = TokenIssuer::new(TEST_SECRET, 60);
        let rendered = format!("{:?}", issuer);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains(TEST_SECRET));
    }
}
