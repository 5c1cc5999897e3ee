//! PostgreSQL content store
//!
//! Poll creation and vote recording run inside transactions; everything
//! else is a single statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    ContentStore, NewPoll, NewPost, NewUser, ProfileUpdate, StoreError, StoreResult,
};
use crate::models::{
    Bookmark, DirectMessage, Notification, Poll, PollOption, PollVote, Post, QuotePost, Repost,
    User,
};

const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id, username, email, password_hash, bio, created_at";
const POST_COLUMNS: &str =
    "id, user_id, content, image_key, created_at, scheduled_at, published_at";

#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique violation onto `Duplicate`, naming the offending field
fn map_unique(err: sqlx::Error, describe: fn(Option<&str>) -> String) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Duplicate(describe(db_err.constraint()));
        }
    }
    StoreError::Database(err)
}

fn user_conflict(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_email_key") => "Email already registered".to_string(),
        _ => "Username already taken".to_string(),
    }
}

/// Escape LIKE metacharacters so `needle` matches literally
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, bio, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.bio)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, user_conflict))
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = $2, email = $3, bio = $4
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.bio)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique(e, user_conflict))?
        .ok_or_else(|| StoreError::NotFound("User not found".to_string()))
    }

    async fn newest_users(&self, limit: i64) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn search_users(&self, query: &str, limit: i64) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username ILIKE $1 ORDER BY id LIMIT $2"
        ))
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_post(&self, post: &NewPost) -> StoreResult<Post> {
        let row = sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts (user_id, content, image_key, created_at, scheduled_at, published_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post.user_id)
        .bind(&post.content)
        .bind(&post.image_key)
        .bind(post.created_at)
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn posts_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn visible_posts(&self) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE published_at IS NOT NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn visible_posts_by_user(&self, user_id: i64) -> StoreResult<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS} FROM posts
            WHERE user_id = $1 AND published_at IS NOT NULL
            ORDER BY published_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn visible_posts_containing(
        &self,
        needle: &str,
        case_insensitive: bool,
    ) -> StoreResult<Vec<Post>> {
        let op = if case_insensitive { "ILIKE" } else { "LIKE" };
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS} FROM posts
            WHERE published_at IS NOT NULL AND content {op} $1
            ORDER BY id
            "#
        ))
        .bind(like_pattern(needle))
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn due_scheduled_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM posts
            WHERE scheduled_at <= $1 AND published_at IS NULL
            ORDER BY scheduled_at, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn publish_post(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE posts SET published_at = $2 WHERE id = $1 AND published_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_repost(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Repost> {
        let row = sqlx::query_as::<_, Repost>(
            r#"
            INSERT INTO reposts (user_id, post_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, post_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn reposts(&self) -> StoreResult<Vec<Repost>> {
        let rows = sqlx::query_as::<_, Repost>(
            "SELECT id, user_id, post_id, created_at FROM reposts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_quote(
        &self,
        user_id: i64,
        post_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<QuotePost> {
        let row = sqlx::query_as::<_, QuotePost>(
            r#"
            INSERT INTO quote_posts (user_id, post_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, post_id, content, created_at
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn quote_posts(&self) -> StoreResult<Vec<QuotePost>> {
        let rows = sqlx::query_as::<_, QuotePost>(
            "SELECT id, user_id, post_id, content, created_at FROM quote_posts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_poll(&self, poll: &NewPoll) -> StoreResult<(Poll, Vec<PollOption>)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Poll>(
            r#"
            INSERT INTO polls (user_id, question, created_at, duration_days, duration_hours, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, question, created_at, duration_days, duration_hours, duration_minutes
            "#,
        )
        .bind(poll.user_id)
        .bind(&poll.question)
        .bind(poll.created_at)
        .bind(poll.duration_days)
        .bind(poll.duration_hours)
        .bind(poll.duration_minutes)
        .fetch_one(&mut *tx)
        .await?;

        let mut options = Vec::with_capacity(poll.options.len());
        for text in &poll.options {
            let option = sqlx::query_as::<_, PollOption>(
                r#"
                INSERT INTO poll_options (poll_id, option_text)
                VALUES ($1, $2)
                RETURNING id, poll_id, option_text, votes
                "#,
            )
            .bind(row.id)
            .bind(text)
            .fetch_one(&mut *tx)
            .await?;
            options.push(option);
        }

        tx.commit().await?;
        Ok((row, options))
    }

    async fn poll_by_id(&self, id: i64) -> StoreResult<Option<Poll>> {
        let poll = sqlx::query_as::<_, Poll>(
            r#"
            SELECT id, user_id, question, created_at, duration_days, duration_hours, duration_minutes
            FROM polls WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(poll)
    }

    async fn polls(&self) -> StoreResult<Vec<Poll>> {
        let polls = sqlx::query_as::<_, Poll>(
            r#"
            SELECT id, user_id, question, created_at, duration_days, duration_hours, duration_minutes
            FROM polls ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(polls)
    }

    async fn option_by_id(&self, id: i64) -> StoreResult<Option<PollOption>> {
        let option = sqlx::query_as::<_, PollOption>(
            "SELECT id, poll_id, option_text, votes FROM poll_options WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(option)
    }

    async fn options_for_polls(&self, poll_ids: &[i64]) -> StoreResult<Vec<PollOption>> {
        if poll_ids.is_empty() {
            return Ok(Vec::new());
        }
        let options = sqlx::query_as::<_, PollOption>(
            r#"
            SELECT id, poll_id, option_text, votes FROM poll_options
            WHERE poll_id = ANY($1)
            ORDER BY poll_id, id
            "#,
        )
        .bind(poll_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(options)
    }

    async fn voted_poll_ids(&self, user_id: i64, poll_ids: &[i64]) -> StoreResult<Vec<i64>> {
        if poll_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT poll_id FROM poll_votes WHERE user_id = $1 AND poll_id = ANY($2)",
        )
        .bind(user_id)
        .bind(poll_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn record_vote(
        &self,
        poll_id: i64,
        option_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<PollVote> {
        let mut tx = self.pool.begin().await?;

        let vote = sqlx::query_as::<_, PollVote>(
            r#"
            INSERT INTO poll_votes (poll_id, user_id, option_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (poll_id, user_id) DO NOTHING
            RETURNING id, poll_id, user_id, option_id, created_at
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .bind(option_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(vote) = vote else {
            tx.rollback().await?;
            return Err(StoreError::Duplicate(
                "You have already voted in this poll".to_string(),
            ));
        };

        let updated = sqlx::query(
            "UPDATE poll_options SET votes = votes + 1 WHERE id = $1 AND poll_id = $2",
        )
        .bind(option_id)
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(StoreError::NotFound("Poll option not found".to_string()));
        }

        tx.commit().await?;
        Ok(vote)
    }

    async fn votes_for_poll(&self, poll_id: i64) -> StoreResult<Vec<PollVote>> {
        let votes = sqlx::query_as::<_, PollVote>(
            r#"
            SELECT id, poll_id, user_id, option_id, created_at
            FROM poll_votes WHERE poll_id = $1 ORDER BY id
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    async fn create_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO follows (follower_id, followed_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, |_| "Already following".to_string()))?;
        Ok(())
    }

    async fn delete_follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followed_id = $2")
                .bind(follower_id)
                .bind(followed_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = $1 AND followed_id = $2)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn followers(&self, user_id: i64) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.password_hash, u.bio, u.created_at
            FROM follows f JOIN users u ON u.id = f.follower_id
            WHERE f.followed_id = $1
            ORDER BY f.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn following(&self, user_id: i64) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.password_hash, u.bio, u.created_at
            FROM follows f JOIN users u ON u.id = f.followed_id
            WHERE f.follower_id = $1
            ORDER BY f.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn follow_counts(&self, user_id: i64) -> StoreResult<(i64, i64)> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE followed_id = $1),
                (SELECT COUNT(*) FROM follows WHERE follower_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DirectMessage> {
        let row = sqlx::query_as::<_, DirectMessage>(
            r#"
            INSERT INTO direct_messages (sender_id, receiver_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, sender_id, receiver_id, content, created_at
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn message_by_id(&self, id: i64) -> StoreResult<Option<DirectMessage>> {
        let row = sqlx::query_as::<_, DirectMessage>(
            "SELECT id, sender_id, receiver_id, content, created_at FROM direct_messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn messages_for(&self, receiver_id: i64) -> StoreResult<Vec<DirectMessage>> {
        let rows = sqlx::query_as::<_, DirectMessage>(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at
            FROM direct_messages
            WHERE receiver_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(receiver_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_notification(
        &self,
        user_id: i64,
        message: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (user_id, message, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, message, created_at, read
            "#,
        )
        .bind(user_id)
        .bind(message)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn notifications_for(&self, user_id: i64) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, message, created_at, read
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_notifications_read(&self, user_id: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn create_bookmark(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Bookmark> {
        sqlx::query_as::<_, Bookmark>(
            r#"
            INSERT INTO bookmarks (user_id, post_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, post_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, |_| "Post already bookmarked".to_string()))
    }

    async fn bookmarks_for(&self, user_id: i64) -> StoreResult<Vec<Bookmark>> {
        let rows = sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, user_id, post_id, created_at
            FROM bookmarks
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("#rust"), "%#rust%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_user_conflict_names_field() {
        assert_eq!(user_conflict(Some("users_email_key")), "Email already registered");
        assert_eq!(user_conflict(Some("users_username_key")), "Username already taken");
    }
}
