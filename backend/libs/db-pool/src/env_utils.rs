//! Environment variable parsing helpers shared by pool and service config.

use std::str::FromStr;

/// Parse `key`, falling back to `default` when unset or unparsable
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse `key`, returning None when unset or unparsable
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse `key`, distinguishing "unset" (default) from "set but invalid" (error)
pub fn parse_env_strict<T: FromStr>(key: &str, default: T) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse {}='{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
