//! Mention extraction and notification
//!
//! Inline `@username` mentions never change how a post is routed; they
//! only notify the mentioned users once the post is published.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::warn;

use crate::db::ContentStore;
use crate::models::User;

static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("Invalid mention regex"));

/// Extract mentioned usernames (without `@`), deduplicated in first-seen order
pub fn extract_mentions(content: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    MENTION_REGEX
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .filter(|username| seen.insert(*username))
        .collect()
}

/// Notify every existing user mentioned in `content`, except the author
///
/// Returns how many notifications were written. Failures are logged and
/// skipped.
pub async fn notify_mentions(
    store: &dyn ContentStore,
    author: &User,
    content: &str,
    now: DateTime<Utc>,
) -> usize {
    let message = format!("{} mentioned you", author.username);
    let mut sent = 0;

    for username in extract_mentions(content) {
        if username == author.username {
            continue;
        }
        let target = match store.user_by_username(username).await {
            Ok(Some(user)) => user,
            Ok(None) => continue,
            Err(e) => {
                warn!(username = %username, error = %e, "Mention lookup failed");
                continue;
            }
        };
        match store.create_notification(target.id, &message, now).await {
            Ok(_) => sent += 1,
            Err(e) => warn!(user_id = target.id, error = %e, "Mention notification failed"),
        }
    }

    sent
}
