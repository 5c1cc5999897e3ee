//! In-process content store
//!
//! All tables sit behind one `std::sync::Mutex`, so every trait method is a
//! single atomic step. The guard is never held across an `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::{
    ContentStore, NewPoll, NewPost, NewUser, ProfileUpdate, StoreError, StoreResult,
};
use crate::models::{
    Bookmark, DirectMessage, Follow, Notification, Poll, PollOption, PollVote, Post, QuotePost,
    Repost, User,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    posts: Vec<Post>,
    reposts: Vec<Repost>,
    quote_posts: Vec<QuotePost>,
    polls: Vec<Poll>,
    poll_options: Vec<PollOption>,
    poll_votes: Vec<PollVote>,
    messages: Vec<DirectMessage>,
    notifications: Vec<Notification>,
    follows: Vec<Follow>,
    bookmarks: Vec<Bookmark>,
    publish_failures: HashSet<i64>,
}

impl Tables {
    /// One id sequence shared by every table, like a fresh BIGSERIAL per row
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: i64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn users_where<F: Fn(&Follow) -> Option<i64>>(&self, pick: F) -> Vec<User> {
        self.follows
            .iter()
            .filter_map(pick)
            .filter_map(|id| self.user(id).cloned())
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryContentStore {
    tables: Mutex<Tables>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Mutations are single pushes or field writes, so a poisoned guard is still consistent
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make `publish_post` fail for this id until cleared
    #[cfg(test)]
    pub(crate) fn fail_publish_for(&self, post_id: i64) {
        self.lock().publish_failures.insert(post_id);
    }

    #[cfg(test)]
    pub(crate) fn clear_publish_failures(&self) {
        self.lock().publish_failures.clear();
    }
}

fn sorted_newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (DateTime<Utc>, i64),
{
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut t = self.lock();
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("Username already taken".to_string()));
        }
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("Email already registered".to_string()));
        }
        let row = User {
            id: t.next_id(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            bio: user.bio.clone(),
            created_at: user.created_at,
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock().user(id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> StoreResult<User> {
        let mut t = self.lock();
        if t
            .users
            .iter()
            .any(|u| u.id != user_id && u.username == update.username)
        {
            return Err(StoreError::Duplicate("Username already taken".to_string()));
        }
        if t
            .users
            .iter()
            .any(|u| u.id != user_id && u.email == update.email)
        {
            return Err(StoreError::Duplicate("Email already registered".to_string()));
        }
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;
        user.username = update.username.clone();
        user.email = update.email.clone();
        user.bio = update.bio.clone();
        Ok(user.clone())
    }

    async fn newest_users(&self, limit: i64) -> StoreResult<Vec<User>> {
        let users = self.lock().users.clone();
        let mut users = sorted_newest_first(users, |u| (u.created_at, u.id));
        users.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(users)
    }

    async fn search_users(&self, query: &str, limit: i64) -> StoreResult<Vec<User>> {
        let needle = query.to_lowercase();
        let mut users: Vec<User> = self
            .lock()
            .users
            .iter()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        users.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(users)
    }

    async fn create_post(&self, post: &NewPost) -> StoreResult<Post> {
        let mut t = self.lock();
        let row = Post {
            id: t.next_id(),
            user_id: post.user_id,
            content: post.content.clone(),
            image_key: post.image_key.clone(),
            created_at: post.created_at,
            scheduled_at: post.scheduled_at,
            published_at: post.published_at,
        };
        t.posts.push(row.clone());
        Ok(row)
    }

    async fn post_by_id(&self, id: i64) -> StoreResult<Option<Post>> {
        Ok(self.lock().posts.iter().find(|p| p.id == id).cloned())
    }

    async fn posts_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Post>> {
        Ok(self
            .lock()
            .posts
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn visible_posts(&self) -> StoreResult<Vec<Post>> {
        Ok(self
            .lock()
            .posts
            .iter()
            .filter(|p| p.is_visible())
            .cloned()
            .collect())
    }

    async fn visible_posts_by_user(&self, user_id: i64) -> StoreResult<Vec<Post>> {
        let posts: Vec<Post> = self
            .lock()
            .posts
            .iter()
            .filter(|p| p.is_visible() && p.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_newest_first(posts, |p| {
            (p.published_at.unwrap_or(p.created_at), p.id)
        }))
    }

    async fn visible_posts_containing(
        &self,
        needle: &str,
        case_insensitive: bool,
    ) -> StoreResult<Vec<Post>> {
        let lowered = needle.to_lowercase();
        Ok(self
            .lock()
            .posts
            .iter()
            .filter(|p| p.is_visible())
            .filter(|p| {
                if case_insensitive {
                    p.content.to_lowercase().contains(&lowered)
                } else {
                    p.content.contains(needle)
                }
            })
            .cloned()
            .collect())
    }

    async fn due_scheduled_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        Ok(self
            .lock()
            .posts
            .iter()
            .filter(|p| p.published_at.is_none())
            .filter(|p| p.scheduled_at.is_some_and(|at| at <= now))
            .map(|p| p.id)
            .collect())
    }

    async fn publish_post(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut t = self.lock();
        if t.publish_failures.contains(&id) {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "injected publish failure for post {}",
                id
            ))));
        }
        match t
            .posts
            .iter_mut()
            .find(|p| p.id == id && p.published_at.is_none())
        {
            Some(post) => {
                post.published_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_repost(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Repost> {
        let mut t = self.lock();
        let row = Repost {
            id: t.next_id(),
            user_id,
            post_id,
            created_at: now,
        };
        t.reposts.push(row.clone());
        Ok(row)
    }

    async fn reposts(&self) -> StoreResult<Vec<Repost>> {
        Ok(self.lock().reposts.clone())
    }

    async fn create_quote(
        &self,
        user_id: i64,
        post_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<QuotePost> {
        let mut t = self.lock();
        let row = QuotePost {
            id: t.next_id(),
            user_id,
            post_id,
            content: content.to_string(),
            created_at: now,
        };
        t.quote_posts.push(row.clone());
        Ok(row)
    }

    async fn quote_posts(&self) -> StoreResult<Vec<QuotePost>> {
        Ok(self.lock().quote_posts.clone())
    }

    async fn create_poll(&self, poll: &NewPoll) -> StoreResult<(Poll, Vec<PollOption>)> {
        let mut t = self.lock();
        let row = Poll {
            id: t.next_id(),
            user_id: poll.user_id,
            question: poll.question.clone(),
            created_at: poll.created_at,
            duration_days: poll.duration_days,
            duration_hours: poll.duration_hours,
            duration_minutes: poll.duration_minutes,
        };
        let mut options = Vec::with_capacity(poll.options.len());
        for text in &poll.options {
            options.push(PollOption {
                id: t.next_id(),
                poll_id: row.id,
                option_text: text.clone(),
                votes: 0,
            });
        }
        t.polls.push(row.clone());
        t.poll_options.extend(options.iter().cloned());
        Ok((row, options))
    }

    async fn poll_by_id(&self, id: i64) -> StoreResult<Option<Poll>> {
        Ok(self.lock().polls.iter().find(|p| p.id == id).cloned())
    }

    async fn polls(&self) -> StoreResult<Vec<Poll>> {
        Ok(self.lock().polls.clone())
    }

    async fn option_by_id(&self, id: i64) -> StoreResult<Option<PollOption>> {
        Ok(self
            .lock()
            .poll_options
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn options_for_polls(&self, poll_ids: &[i64]) -> StoreResult<Vec<PollOption>> {
        let mut options: Vec<PollOption> = self
            .lock()
            .poll_options
            .iter()
            .filter(|o| poll_ids.contains(&o.poll_id))
            .cloned()
            .collect();
        options.sort_by_key(|o| (o.poll_id, o.id));
        Ok(options)
    }

    async fn voted_poll_ids(&self, user_id: i64, poll_ids: &[i64]) -> StoreResult<Vec<i64>> {
        Ok(self
            .lock()
            .poll_votes
            .iter()
            .filter(|v| v.user_id == user_id && poll_ids.contains(&v.poll_id))
            .map(|v| v.poll_id)
            .collect())
    }

    async fn record_vote(
        &self,
        poll_id: i64,
        option_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<PollVote> {
        let mut t = self.lock();
        if t
            .poll_votes
            .iter()
            .any(|v| v.poll_id == poll_id && v.user_id == user_id)
        {
            return Err(StoreError::Duplicate(
                "You have already voted in this poll".to_string(),
            ));
        }
        let id = t.next_id();
        let option = t
            .poll_options
            .iter_mut()
            .find(|o| o.id == option_id && o.poll_id == poll_id)
            .ok_or_else(|| StoreError::NotFound("Poll option not found".to_string()))?;
        option.votes += 1;

        let vote = PollVote {
            id,
            poll_id,
            user_id,
            option_id,
            created_at: now,
        };
        t.poll_votes.push(vote.clone());
        Ok(vote)
    }

    async fn votes_for_poll(&self, poll_id: i64) -> StoreResult<Vec<PollVote>> {
        Ok(self
            .lock()
            .poll_votes
            .iter()
            .filter(|v| v.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn create_follow(
        &self,
        follower_id: i64,
        followed_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut t = self.lock();
        if follower_id == followed_id {
            return Err(StoreError::Duplicate("You cannot follow yourself".to_string()));
        }
        if t
            .follows
            .iter()
            .any(|f| f.follower_id == follower_id && f.followed_id == followed_id)
        {
            return Err(StoreError::Duplicate("Already following".to_string()));
        }
        t.follows.push(Follow {
            follower_id,
            followed_id,
            created_at: now,
        });
        Ok(())
    }

    async fn delete_follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<bool> {
        let mut t = self.lock();
        let before = t.follows.len();
        t.follows
            .retain(|f| !(f.follower_id == follower_id && f.followed_id == followed_id));
        Ok(t.follows.len() < before)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> StoreResult<bool> {
        Ok(self
            .lock()
            .follows
            .iter()
            .any(|f| f.follower_id == follower_id && f.followed_id == followed_id))
    }

    async fn followers(&self, user_id: i64) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()
            .users_where(|f| (f.followed_id == user_id).then_some(f.follower_id)))
    }

    async fn following(&self, user_id: i64) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()
            .users_where(|f| (f.follower_id == user_id).then_some(f.followed_id)))
    }

    async fn follow_counts(&self, user_id: i64) -> StoreResult<(i64, i64)> {
        let t = self.lock();
        let followers = t.follows.iter().filter(|f| f.followed_id == user_id).count();
        let following = t.follows.iter().filter(|f| f.follower_id == user_id).count();
        Ok((followers as i64, following as i64))
    }

    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DirectMessage> {
        let mut t = self.lock();
        let row = DirectMessage {
            id: t.next_id(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: now,
        };
        t.messages.push(row.clone());
        Ok(row)
    }

    async fn message_by_id(&self, id: i64) -> StoreResult<Option<DirectMessage>> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn messages_for(&self, receiver_id: i64) -> StoreResult<Vec<DirectMessage>> {
        let messages: Vec<DirectMessage> = self
            .lock()
            .messages
            .iter()
            .filter(|m| m.receiver_id == receiver_id)
            .cloned()
            .collect();
        Ok(sorted_newest_first(messages, |m| (m.created_at, m.id)))
    }

    async fn create_notification(
        &self,
        user_id: i64,
        message: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Notification> {
        let mut t = self.lock();
        let row = Notification {
            id: t.next_id(),
            user_id,
            message: message.to_string(),
            created_at: now,
            read: false,
        };
        t.notifications.push(row.clone());
        Ok(row)
    }

    async fn notifications_for(&self, user_id: i64) -> StoreResult<Vec<Notification>> {
        let rows: Vec<Notification> = self
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_newest_first(rows, |n| (n.created_at, n.id)))
    }

    async fn mark_notifications_read(&self, user_id: i64) -> StoreResult<u64> {
        let mut t = self.lock();
        let mut changed = 0;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn create_bookmark(
        &self,
        user_id: i64,
        post_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Bookmark> {
        let mut t = self.lock();
        if t
            .bookmarks
            .iter()
            .any(|b| b.user_id == user_id && b.post_id == post_id)
        {
            return Err(StoreError::Duplicate("Post already bookmarked".to_string()));
        }
        let row = Bookmark {
            id: t.next_id(),
            user_id,
            post_id,
            created_at: now,
        };
        t.bookmarks.push(row.clone());
        Ok(row)
    }

    async fn bookmarks_for(&self, user_id: i64) -> StoreResult<Vec<Bookmark>> {
        let rows: Vec<Bookmark> = self
            .lock()
            .bookmarks
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_newest_first(rows, |b| (b.created_at, b.id)))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
