//! Follow graph and profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use super::accounts::validate_username;
use super::{post_views, require_user, user_named};
use crate::db::{ContentStore, ProfileUpdate, StoreError};
use crate::error::{AppError, Result};
use crate::models::{PostView, User, UserSummary};

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: UserSummary,
    pub joined_at: DateTime<Utc>,
    pub followers_count: i64,
    pub following_count: i64,
    /// Whether the viewer follows this user
    pub is_following: bool,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileEdit {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email, length(max = 150))]
    pub email: String,
    #[validate(length(max = 300))]
    pub bio: Option<String>,
}

pub struct SocialService {
    store: Arc<dyn ContentStore>,
}

impl SocialService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn follow(&self, follower_id: i64, username: &str, now: DateTime<Utc>) -> Result<()> {
        let follower = require_user(&*self.store, follower_id).await?;
        let target = user_named(&*self.store, username).await?;
        if target.id == follower.id {
            return Err(AppError::Validation("You cannot follow yourself".to_string()));
        }

        match self.store.create_follow(follower.id, target.id, now).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::Conflict(format!(
                    "You are already following {}",
                    target.username
                )))
            }
            Err(e) => return Err(e.into()),
        }

        self.notify(target.id, &format!("{} followed you", follower.username), now)
            .await;
        info!(follower_id = follower.id, followed_id = target.id, "Follow created");
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: i64, username: &str, now: DateTime<Utc>) -> Result<()> {
        let follower = require_user(&*self.store, follower_id).await?;
        let target = user_named(&*self.store, username).await?;

        if !self.store.delete_follow(follower.id, target.id).await? {
            return Err(AppError::NotFound(format!(
                "You are not following {}",
                target.username
            )));
        }

        self.notify(target.id, &format!("{} unfollowed you", follower.username), now)
            .await;
        info!(follower_id = follower.id, followed_id = target.id, "Follow removed");
        Ok(())
    }

    pub async fn profile(&self, viewer_id: i64, username: &str) -> Result<Profile> {
        let user = user_named(&*self.store, username).await?;
        let (counts, is_following, posts) = tokio::try_join!(
            self.store.follow_counts(user.id),
            self.store.is_following(viewer_id, user.id),
            self.store.visible_posts_by_user(user.id),
        )?;
        let posts = post_views(&*self.store, posts).await?;

        Ok(Profile {
            followers_count: counts.0,
            following_count: counts.1,
            is_following,
            posts,
            joined_at: user.created_at,
            user: UserSummary::from(&user),
        })
    }

    pub async fn update_profile(&self, user_id: i64, edit: ProfileEdit) -> Result<User> {
        let edit = ProfileEdit {
            username: edit.username.trim().to_string(),
            email: edit.email.trim().to_string(),
            bio: edit.bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
        };
        edit.validate()?;
        validate_username(&edit.username)?;
        require_user(&*self.store, user_id).await?;

        let user = self
            .store
            .update_profile(
                user_id,
                &ProfileUpdate {
                    username: edit.username,
                    email: edit.email,
                    bio: edit.bio,
                },
            )
            .await?;
        info!(user_id, "Profile updated");
        Ok(user)
    }

    pub async fn followers(&self, username: &str) -> Result<Vec<UserSummary>> {
        let user = user_named(&*self.store, username).await?;
        let users = self.store.followers(user.id).await?;
        Ok(users.iter().map(UserSummary::from).collect())
    }

    pub async fn following(&self, username: &str) -> Result<Vec<UserSummary>> {
        let user = user_named(&*self.store, username).await?;
        let users = self.store.following(user.id).await?;
        Ok(users.iter().map(UserSummary::from).collect())
    }

    async fn notify(&self, user_id: i64, message: &str, now: DateTime<Utc>) {
        if let Err(e) = self.store.create_notification(user_id, message, now).await {
            warn!(user_id, error = %e, "Follow notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let svc = SocialService::new(store.clone());

        svc.follow(alice.id, "bob", t0()).await.unwrap();
        assert!(store.is_following(alice.id, bob.id).await.unwrap());
        assert!(!store.is_following(bob.id, alice.id).await.unwrap());
        assert_eq!(
            store.notifications_for(bob.id).await.unwrap()[0].message,
            "alice followed you"
        );

        let followers = svc.followers("bob").await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].username, "alice");
        assert_eq!(svc.following("alice").await.unwrap()[0].username, "bob");

        svc.unfollow(alice.id, "bob", mins(1)).await.unwrap();
        assert!(!store.is_following(alice.id, bob.id).await.unwrap());
        assert_eq!(
            store.notifications_for(bob.id).await.unwrap()[0].message,
            "alice unfollowed you"
        );
    }

    #[tokio::test]
    async fn test_follow_rejections() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        user(&store, "bob").await;
        let svc = SocialService::new(store.clone());

        assert!(matches!(
            svc.follow(alice.id, "alice", t0()).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.follow(alice.id, "ghost", t0()).await,
            Err(AppError::NotFound(_))
        ));
        svc.follow(alice.id, "bob", t0()).await.unwrap();
        assert!(matches!(
            svc.follow(alice.id, "bob", t0()).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.follow_counts(alice.id).await.unwrap(), (0, 1));

        svc.unfollow(alice.id, "bob", t0()).await.unwrap();
        assert!(matches!(
            svc.unfollow(alice.id, "bob", t0()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_profile() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        published_post(&store, &bob, "first", mins(0)).await;
        let second = published_post(&store, &bob, "second", mins(1)).await;
        scheduled_post(&store, &bob, "later", mins(1), mins(30)).await;
        let svc = SocialService::new(store.clone());
        svc.follow(alice.id, "bob", t0()).await.unwrap();

        let profile = svc.profile(alice.id, "bob").await.unwrap();
        assert_eq!(profile.user.id, bob.id);
        assert_eq!(profile.followers_count, 1);
        assert_eq!(profile.following_count, 0);
        assert!(profile.is_following);
        assert_eq!(profile.posts.len(), 2);
        assert_eq!(profile.posts[0].post.id, second.id);

        let own = svc.profile(bob.id, "bob").await.unwrap();
        assert!(!own.is_following);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        user(&store, "bob").await;
        let svc = SocialService::new(store.clone());

        let edit = |username: &str, email: &str| ProfileEdit {
            username: username.to_string(),
            email: email.to_string(),
            bio: Some("  rustacean ".to_string()),
        };

        let updated = svc
            .update_profile(alice.id, edit("alice_r", "alice@new.example.com"))
            .await
            .unwrap();
        assert_eq!(updated.username, "alice_r");
        assert_eq!(updated.bio.as_deref(), Some("rustacean"));

        assert!(matches!(
            svc.update_profile(alice.id, edit("bob", "alice@new.example.com")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            svc.update_profile(alice.id, edit("alice r", "alice@new.example.com")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.update_profile(alice.id, edit("alice_r", "nope")).await,
            Err(AppError::Validation(_))
        ));
    }
}
