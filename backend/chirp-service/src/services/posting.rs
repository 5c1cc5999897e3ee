//! Post routing and creation
//!
//! Submitted text becomes one of three things:
//! - `/dm <username> <message>`: a direct message, no feed post
//! - content with a future `scheduled_at`: a hidden post for the publisher
//! - anything else: a post published immediately
//!
//! The 144 character limit applies before routing. Inline `@mentions`
//! only trigger notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{check_content, mentions, require_user, user_named, MAX_MESSAGE_LENGTH, MAX_POST_LENGTH};
use crate::db::{ContentStore, NewPost};
use crate::error::{AppError, Result};
use crate::models::{DirectMessage, Post, PostView, QuotePost, Repost, User};

pub const DM_PREFIX: &str = "/dm ";
pub const MAX_IMAGE_KEY_LENGTH: usize = 100;

#[derive(Debug, Clone)]
pub struct Submission {
    pub content: String,
    pub image_key: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostOutcome {
    Posted { post: Post },
    Scheduled { post: Post },
    DirectMessage { message: DirectMessage },
}

/// Parsed form of a `/dm` command
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DmCommand<'a> {
    pub username: &'a str,
    pub message: &'a str,
}

/// Split `/dm <username> <message>`; None when `content` is not a DM command
///
/// A DM command with fewer than three fields is a validation error.
pub(crate) fn parse_dm(content: &str) -> Result<Option<DmCommand<'_>>> {
    if !content.starts_with(DM_PREFIX) {
        return Ok(None);
    }
    let parts: Vec<&str> = content.splitn(3, ' ').collect();
    match parts.as_slice() {
        [_, username, message] if !username.is_empty() => Ok(Some(DmCommand {
            username: *username,
            message: *message,
        })),
        _ => Err(AppError::Validation(
            "Direct messages must use the form: /dm <username> <message>".to_string(),
        )),
    }
}

pub struct PostingService {
    store: Arc<dyn ContentStore>,
}

impl PostingService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn submit(
        &self,
        author_id: i64,
        submission: Submission,
        now: DateTime<Utc>,
    ) -> Result<PostOutcome> {
        check_content(&submission.content, MAX_POST_LENGTH, "Post content")?;
        let author = require_user(&*self.store, author_id).await?;

        if let Some(dm) = parse_dm(&submission.content)? {
            let message = self.send_dm(&author, dm, now).await?;
            return Ok(PostOutcome::DirectMessage { message });
        }

        if let Some(key) = &submission.image_key {
            if key.chars().count() > MAX_IMAGE_KEY_LENGTH {
                return Err(AppError::Validation(format!(
                    "image_key must be at most {} characters",
                    MAX_IMAGE_KEY_LENGTH
                )));
            }
        }

        let scheduled = submission.scheduled_at.filter(|at| *at > now);
        let post = self
            .store
            .create_post(&NewPost {
                user_id: author.id,
                content: submission.content,
                image_key: submission.image_key,
                created_at: now,
                scheduled_at: submission.scheduled_at,
                published_at: if scheduled.is_some() { None } else { Some(now) },
            })
            .await?;

        if scheduled.is_some() {
            info!(post_id = post.id, user_id = author.id, scheduled_at = ?post.scheduled_at, "Post scheduled");
            return Ok(PostOutcome::Scheduled { post });
        }

        mentions::notify_mentions(&*self.store, &author, &post.content, now).await;
        info!(post_id = post.id, user_id = author.id, "Post published");
        Ok(PostOutcome::Posted { post })
    }

    async fn send_dm(
        &self,
        sender: &User,
        dm: DmCommand<'_>,
        now: DateTime<Utc>,
    ) -> Result<DirectMessage> {
        check_content(dm.message, MAX_MESSAGE_LENGTH, "Message")?;
        let receiver = user_named(&*self.store, dm.username).await?;
        if receiver.id == sender.id {
            return Err(AppError::Validation(
                "You cannot send a direct message to yourself".to_string(),
            ));
        }

        let message = self
            .store
            .create_message(sender.id, receiver.id, dm.message, now)
            .await?;

        let note = format!("{} sent you a message", sender.username);
        if let Err(e) = self.store.create_notification(receiver.id, &note, now).await {
            warn!(message_id = message.id, error = %e, "DM notification failed");
        }

        info!(
            message_id = message.id,
            sender_id = sender.id,
            receiver_id = receiver.id,
            "Direct message routed from post"
        );
        Ok(message)
    }

    /// Look up a post that can be reposted or quoted
    pub async fn visible_post(&self, post_id: i64) -> Result<Post> {
        self.store
            .post_by_id(post_id)
            .await?
            .filter(Post::is_visible)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    /// The post a quote would embed, with its author
    pub async fn quote_target(&self, post_id: i64) -> Result<PostView> {
        let post = self.visible_post(post_id).await?;
        super::post_views(&*self.store, vec![post])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    pub async fn repost(&self, user_id: i64, post_id: i64, now: DateTime<Utc>) -> Result<Repost> {
        require_user(&*self.store, user_id).await?;
        let original = self.visible_post(post_id).await?;
        let repost = self.store.create_repost(user_id, original.id, now).await?;
        info!(repost_id = repost.id, post_id, user_id, "Post reposted");
        Ok(repost)
    }

    pub async fn quote(
        &self,
        user_id: i64,
        post_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotePost> {
        check_content(content, MAX_POST_LENGTH, "Quote content")?;
        require_user(&*self.store, user_id).await?;
        let original = self.visible_post(post_id).await?;
        let quote = self
            .store
            .create_quote(user_id, original.id, content, now)
            .await?;
        info!(quote_id = quote.id, post_id, user_id, "Post quoted");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    fn submission(content: &str) -> Submission {
        Submission {
            content: content.to_string(),
            image_key: None,
            scheduled_at: None,
        }
    }

    #[test]
    fn test_parse_dm() {
        assert_eq!(parse_dm("hello world").unwrap(), None);
        assert_eq!(parse_dm("/dmbob hi").unwrap(), None);
        assert_eq!(
            parse_dm("/dm bob see you at 5").unwrap(),
            Some(DmCommand {
                username: "bob",
                message: "see you at 5"
            })
        );
        assert!(parse_dm("/dm bob").is_err());
        assert!(parse_dm("/dm  hi there").is_err());
    }

    #[tokio::test]
    async fn test_plain_post_is_published_now() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let svc = PostingService::new(store.clone());

        let outcome = svc.submit(alice.id, submission("hi all"), t0()).await.unwrap();
        match outcome {
            PostOutcome::Posted { post } => {
                assert_eq!(post.published_at, Some(t0()));
                assert_eq!(post.created_at, t0());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_too_long_is_rejected_before_routing() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        user(&store, "bob").await;
        let svc = PostingService::new(store.clone());

        let long_dm = format!("/dm bob {}", "x".repeat(140));
        let err = svc.submit(alice.id, submission(&long_dm), t0()).await.unwrap_err();
        assert!(matches!(err, AppError::ContentTooLong { limit: 144, .. }));
        assert!(store.messages_for(2).await.unwrap().is_empty());
        assert!(store.visible_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dm_routing_creates_no_post() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let svc = PostingService::new(store.clone());

        let outcome = svc
            .submit(alice.id, submission("/dm bob lunch at noon?"), t0())
            .await
            .unwrap();
        assert!(matches!(outcome, PostOutcome::DirectMessage { .. }));

        assert!(store.visible_posts().await.unwrap().is_empty());
        let inbox = store.messages_for(bob.id).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].content, "lunch at noon?");
        let notes = store.notifications_for(bob.id).await.unwrap();
        assert_eq!(notes[0].message, "alice sent you a message");
    }

    #[tokio::test]
    async fn test_dm_errors() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let svc = PostingService::new(store.clone());

        assert!(matches!(
            svc.submit(alice.id, submission("/dm ghost hello"), t0()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.submit(alice.id, submission("/dm alice talking to myself"), t0()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.submit(alice.id, submission("/dm alice"), t0()).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_mentions_notify_but_still_post() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let svc = PostingService::new(store.clone());

        let outcome = svc
            .submit(alice.id, submission("thanks @bob!"), t0())
            .await
            .unwrap();
        assert!(matches!(outcome, PostOutcome::Posted { .. }));
        assert_eq!(store.visible_posts().await.unwrap().len(), 1);
        assert!(store.messages_for(bob.id).await.unwrap().is_empty());
        assert_eq!(
            store.notifications_for(bob.id).await.unwrap()[0].message,
            "alice mentioned you"
        );
    }

    #[tokio::test]
    async fn test_future_schedule_hides_post() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let svc = PostingService::new(store.clone());

        let mut sub = submission("see you tomorrow @bob");
        sub.scheduled_at = Some(mins(60));
        let outcome = svc.submit(alice.id, sub, t0()).await.unwrap();
        match outcome {
            PostOutcome::Scheduled { post } => assert!(post.published_at.is_none()),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(store.visible_posts().await.unwrap().is_empty());
        assert!(store.notifications_for(bob.id).await.unwrap().is_empty());

        let mut past = submission("already due");
        past.scheduled_at = Some(mins(-5));
        let outcome = svc.submit(alice.id, past, t0()).await.unwrap();
        assert!(matches!(outcome, PostOutcome::Posted { .. }));
    }

    #[tokio::test]
    async fn test_repost_and_quote_require_visible_original() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let hidden = scheduled_post(&store, &alice, "soon", t0(), mins(30)).await;
        let shown = published_post(&store, &alice, "now", t0()).await;
        let svc = PostingService::new(store.clone());

        assert!(matches!(
            svc.repost(alice.id, hidden.id, t0()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.repost(alice.id, 777, t0()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(svc.repost(alice.id, shown.id, t0()).await.is_ok());

        assert!(matches!(
            svc.quote(alice.id, shown.id, &"q".repeat(145), t0()).await,
            Err(AppError::ContentTooLong { .. })
        ));
        assert!(matches!(
            svc.quote(alice.id, shown.id, "  ", t0()).await,
            Err(AppError::Validation(_))
        ));
        let quote = svc.quote(alice.id, shown.id, "agreed", t0()).await.unwrap();
        assert_eq!(quote.post_id, shown.id);

        let target = svc.quote_target(shown.id).await.unwrap();
        assert_eq!(target.post.id, shown.id);
        assert_eq!(target.author.username, "alice");
        assert!(svc.quote_target(hidden.id).await.is_err());
    }
}
