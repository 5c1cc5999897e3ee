//! Configuration management for chirp-service
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! first by `main`). Pool tuning beyond `DATABASE_MAX_CONNECTIONS` is read
//! by `db_pool::DbConfig::from_env`.

use db_pool::env_utils::parse_env_strict as parse_env_or_default;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Placeholder secret used outside production when `JWT_SECRET` is unset
pub const DEV_JWT_SECRET: &str = "chirp-dev-secret-change-me";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Which content store backs the service
    pub store: StoreBackend,
    /// Token signing
    pub auth: AuthConfig,
    /// Scheduled post publisher
    pub publisher: PublisherConfig,
    /// Feed paging and sidebar sizes
    pub feed: FeedConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    /// Process-local tables; contents are lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!(
                "Unknown CHIRP_STORE '{}': expected 'postgres' or 'memory'",
                other
            )),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Page size when the request names none
    pub default_limit: usize,
    /// Upper bound for a requested page size
    pub max_limit: usize,
    pub trending_limit: usize,
    pub newest_users_limit: i64,
    /// Cap on users returned by search
    pub search_user_limit: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
            trending_limit: 5,
            newest_users_limit: 5,
            search_user_limit: 20,
        }
    }
}

impl FeedConfig {
    /// Requested page size, defaulted and clamped to 1..=max_limit
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let production = app_env.eq_ignore_ascii_case("production");
        let feed_defaults = FeedConfig::default();

        let config = Config {
            app: AppConfig {
                env: app_env.clone(),
                host: std::env::var("CHIRP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or_default("CHIRP_PORT", 8080)?,
            },
            cors: {
                let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(value) => value,
                    Err(_) if production => {
                        return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
                    }
                    Err(_) => "http://localhost:3000".to_string(),
                };

                if production && allowed_origins.trim() == "*" {
                    return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
                }

                CorsConfig { allowed_origins }
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/chirp".to_string()),
                max_connections: parse_env_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            store: match std::env::var("CHIRP_STORE") {
                Ok(value) => value.parse()?,
                Err(_) => StoreBackend::Postgres,
            },
            auth: {
                let jwt_secret = match std::env::var("JWT_SECRET") {
                    Ok(value) if !value.trim().is_empty() => value,
                    _ if production => {
                        return Err("JWT_SECRET must be set in production".to_string())
                    }
                    _ => DEV_JWT_SECRET.to_string(),
                };
                if production && jwt_secret == DEV_JWT_SECRET {
                    return Err("JWT_SECRET cannot use the development default in production".to_string());
                }

                AuthConfig {
                    jwt_secret,
                    token_ttl_secs: parse_env_or_default("JWT_TTL_SECS", 3600)?,
                }
            },
            publisher: PublisherConfig {
                interval_secs: parse_env_or_default("PUBLISHER_INTERVAL_SECS", 60)?,
            },
            feed: FeedConfig {
                default_limit: parse_env_or_default("FEED_DEFAULT_LIMIT", feed_defaults.default_limit)?,
                max_limit: parse_env_or_default("FEED_MAX_LIMIT", feed_defaults.max_limit)?,
                trending_limit: parse_env_or_default("TRENDING_LIMIT", feed_defaults.trending_limit)?,
                newest_users_limit: parse_env_or_default(
                    "NEWEST_USERS_LIMIT",
                    feed_defaults.newest_users_limit,
                )?,
                search_user_limit: parse_env_or_default(
                    "SEARCH_USER_LIMIT",
                    feed_defaults.search_user_limit,
                )?,
            },
        };

        if config.publisher.interval_secs == 0 {
            return Err("PUBLISHER_INTERVAL_SECS must be greater than zero".to_string());
        }
        if config.auth.token_ttl_secs <= 0 {
            return Err("JWT_TTL_SECS must be greater than zero".to_string());
        }

        Ok(config)
    }
}
