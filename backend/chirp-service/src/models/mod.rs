//! Data models for chirp-service
//!
//! Row types map one-to-one onto the tables in `migrations/`; the feed
//! shapes derived from them live in `feed`.

pub mod feed;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub use feed::*;

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public projection of a user, safe to embed in any response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub bio: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            bio: user.bio.clone(),
        }
    }
}

/// Short post; visible once `published_at` is set
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub image_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn is_visible(&self) -> bool {
        self.published_at.is_some()
    }
}

/// Post together with its resolved author
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Repost {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct QuotePost {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Poll {
    pub id: i64,
    pub user_id: i64,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub duration_days: i32,
    pub duration_hours: i32,
    pub duration_minutes: i32,
}

impl Poll {
    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.duration_days))
            + Duration::hours(i64::from(self.duration_hours))
            + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Saturates at the latest representable instant
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(self.duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// A poll accepts votes strictly before its expiry instant
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PollOption {
    pub id: i64,
    pub poll_id: i64,
    pub option_text: String,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PollVote {
    pub id: i64,
    pub poll_id: i64,
    pub user_id: i64,
    pub option_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: i64,
    pub followed_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}
