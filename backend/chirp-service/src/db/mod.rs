//! Content store: persistence boundary for every chirp-service entity
//!
//! `ContentStore` is implemented by `PgContentStore` (PostgreSQL via sqlx)
//! and `MemoryContentStore` (single-process, used by tests and the
//! `memory` store backend). Callers pass timestamps in explicitly so that
//! both backends persist exactly what the service decided.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Bookmark, DirectMessage, Notification, Poll, PollOption, PollVote, Post, QuotePost, Repost,
    User,
};

pub use memory::MemoryContentStore;
pub use postgres::PgContentStore;

/// Embedded sqlx migrations for the PostgreSQL backend
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Replacement values for the editable profile fields
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub content: String,
    pub image_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// None keeps the post hidden until the publisher stamps it
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub user_id: i64,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub duration_days: i32,
    pub duration_hours: i32,
    pub duration_minutes: i32,
    /// Option texts in display order
    pub options: Vec<String>,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    // ---- users ----

    /// Fails with `Duplicate` when the username or email is taken
    async fn create_user(&self, user: &NewUser) -> StoreResult<User>;
    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Bulk lookup; ids that do not resolve are simply absent from the result
    async fn users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>>;
    async fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> StoreResult<User>;
    /// Most recently registered users first
    async fn newest_users(&self, limit: i64) -> StoreResult<Vec<User>>;
    /// Case-insensitive substring match on username
    async fn search_users(&self, query: &str, limit: i64) -> StoreResult<Vec<User>>;

    // ---- posts ----

    async fn create_post(&self, post: &NewPost) -> StoreResult<Post>;
    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>>;
    async fn posts_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Post>>;
    /// All published posts in id order
    async fn visible_posts(&self) -> StoreResult<Vec<Post>>;
    /// Published posts of one author, newest first
    async fn visible_posts_by_user(&self, user_id: i64) -> StoreResult<Vec<Post>>;
    /// Published posts whose content contains `needle`, in id order
    async fn visible_posts_containing(
        &self,
        needle: &str,
        case_insensitive: bool,
    ) -> StoreResult<Vec<Post>>;
    /// Ids of scheduled posts whose instant has passed and are still unpublished
    async fn due_scheduled_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<i64>>;
    /// Stamp `published_at` if still unset; false when nothing changed
    async fn publish_post(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool>;

    // ---- reposts & quotes ----

    async fn create_repost(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Repost>;
    async fn reposts(&self) -> StoreResult<Vec<Repost>>;
    async fn create_quote(
        &self,
        user_id: i64,
        post_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<QuotePost>;
    async fn quote_posts(&self) -> StoreResult<Vec<QuotePost>>;

    // ---- polls ----

    /// Inserts the poll and all of its options atomically
    async fn create_poll(&self, poll: &NewPoll) -> StoreResult<(Poll, Vec<PollOption>)>;
    async fn poll_by_id(&self, id: i64) -> StoreResult<Option<Poll>>;
    async fn polls(&self) -> StoreResult<Vec<Poll>>;
    async fn option_by_id(&self, id: i64) -> StoreResult<Option<PollOption>>;
    /// Options of the given polls, grouped by poll and in creation order
    async fn options_for_polls(&self, poll_ids: &[i64]) -> StoreResult<Vec<PollOption>>;
    /// Subset of `poll_ids` the user has voted in
    async fn voted_poll_ids(&self, user_id: i64, poll_ids: &[i64]) -> StoreResult<Vec<i64>>;
    /// Insert the vote row and bump the option counter as one unit
    ///
    /// A second vote by the same user in the same poll fails with
    /// `Duplicate` and leaves every counter untouched.
    async fn record_vote(
        &self,
        poll_id: i64,
        option_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<PollVote>;
    async fn votes_for_poll(&self, poll_id: i64) -> StoreResult<Vec<PollVote>>;

    // ---- follows ----

    async fn create_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn delete_follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<bool>;
    async fn is_following(&self, follower_id: i64, followed_id: i64) -> StoreResult<bool>;
    async fn followers(&self, user_id: i64) -> StoreResult<Vec<User>>;
    async fn following(&self, user_id: i64) -> StoreResult<Vec<User>>;
    /// (followers, following)
    async fn follow_counts(&self, user_id: i64) -> StoreResult<(i64, i64)>;

    // ---- direct messages ----

    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DirectMessage>;
    async fn message_by_id(&self, id: i64) -> StoreResult<Option<DirectMessage>>;
    /// Messages received by the user, newest first
    async fn messages_for(&self, receiver_id: i64) -> StoreResult<Vec<DirectMessage>>;

    // ---- notifications ----

    async fn create_notification(
        &self,
        user_id: i64,
        message: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification>;
    async fn notifications_for(&self, user_id: i64) -> StoreResult<Vec<Notification>>;
    async fn mark_notifications_read(&self, user_id: i64) -> StoreResult<u64>;

    // ---- bookmarks ----

    async fn create_bookmark(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Bookmark>;
    /// Newest first
    async fn bookmarks_for(&self, user_id: i64) -> StoreResult<Vec<Bookmark>>;

    async fn ping(&self) -> StoreResult<()>;
}
