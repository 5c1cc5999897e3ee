//! Business logic layer
//!
//! Services own an `Arc<dyn ContentStore>` and take the current instant as
//! an argument, so the same code runs against PostgreSQL in production and
//! the in-memory store in tests.

pub mod accounts;
pub mod bookmarks;
pub mod hashtags;
pub mod mentions;
pub mod messaging;
pub mod polls;
pub mod posting;
pub mod search;
pub mod social;
pub mod timeline;

use std::collections::{BTreeSet, HashMap};

use crate::db::ContentStore;
use crate::error::{AppError, Result};
use crate::models::{Post, PostView, User, UserSummary};

pub use accounts::AccountService;
pub use bookmarks::BookmarkService;
pub use hashtags::TrendingService;
pub use messaging::MessagingService;
pub use polls::PollService;
pub use posting::PostingService;
pub use search::SearchService;
pub use social::SocialService;
pub use timeline::TimelineService;

/// Post bodies, quotes and DM route commands share this limit
pub const MAX_POST_LENGTH: usize = 144;
pub const MAX_MESSAGE_LENGTH: usize = 500;

/// Reject empty text and text over `limit` characters
pub(crate) fn check_content(content: &str, limit: usize, what: &str) -> Result<()> {
    let actual = content.chars().count();
    if actual > limit {
        return Err(AppError::ContentTooLong { limit, actual });
    }
    if content.trim().is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", what)));
    }
    Ok(())
}

/// Load the acting user; a token for a vanished account is no longer valid
pub(crate) async fn require_user(store: &dyn ContentStore, user_id: i64) -> Result<User> {
    store
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))
}

pub(crate) async fn user_named(store: &dyn ContentStore, username: &str) -> Result<User> {
    store
        .user_by_username(username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", username)))
}

/// Resolve every distinct id with one bulk lookup
///
/// Fails with `Integrity` if any id has no user row behind it.
pub(crate) async fn resolve_authors<I>(
    store: &dyn ContentStore,
    ids: I,
) -> Result<HashMap<i64, UserSummary>>
where
    I: IntoIterator<Item = i64>,
{
    let wanted: BTreeSet<i64> = ids.into_iter().collect();
    if wanted.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<i64> = wanted.iter().copied().collect();
    let authors: HashMap<i64, UserSummary> = store
        .users_by_ids(&ids)
        .await?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    if let Some(missing) = wanted.iter().find(|id| !authors.contains_key(id)) {
        return Err(AppError::Integrity(format!(
            "author {} referenced by content does not exist",
            missing
        )));
    }

    Ok(authors)
}

/// Attach authors to posts, preserving order
pub(crate) async fn post_views(store: &dyn ContentStore, posts: Vec<Post>) -> Result<Vec<PostView>> {
    let authors = resolve_authors(store, posts.iter().map(|p| p.user_id)).await?;
    posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.user_id).cloned().ok_or_else(|| {
                AppError::Integrity(format!("post {} has no author", post.id))
            })?;
            Ok(PostView { post, author })
        })
        .collect()
}

/// Newest published first, id descending on ties
pub(crate) fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        (b.published_at, b.id).cmp(&(a.published_at, a.id))
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::db::{ContentStore, MemoryContentStore, NewPost, NewUser};
    use crate::models::{Post, User};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    pub fn mins(n: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(n)
    }

    pub fn memory_store() -> Arc<MemoryContentStore> {
        Arc::new(MemoryContentStore::new())
    }

    pub async fn user(store: &MemoryContentStore, name: &str) -> User {
        store
            .create_user(&NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: "unused".to_string(),
                bio: None,
                created_at: t0(),
            })
            .await
            .unwrap()
    }

    pub async fn published_post(
        store: &MemoryContentStore,
        author: &User,
        content: &str,
        at: DateTime<Utc>,
    ) -> Post {
        store
            .create_post(&NewPost {
                user_id: author.id,
                content: content.to_string(),
                image_key: None,
                created_at: at,
                scheduled_at: None,
                published_at: Some(at),
            })
            .await
            .unwrap()
    }

    pub async fn scheduled_post(
        store: &MemoryContentStore,
        author: &User,
        content: &str,
        created: DateTime<Utc>,
        scheduled: DateTime<Utc>,
    ) -> Post {
        store
            .create_post(&NewPost {
                user_id: author.id,
                content: content.to_string(),
                image_key: None,
                created_at: created,
                scheduled_at: Some(scheduled),
                published_at: None,
            })
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_check_content_limits() {
        assert!(check_content("hello", MAX_POST_LENGTH, "Post").is_ok());
        assert!(check_content(&"a".repeat(144), MAX_POST_LENGTH, "Post").is_ok());
        assert!(matches!(
            check_content(&"a".repeat(145), MAX_POST_LENGTH, "Post"),
            Err(AppError::ContentTooLong {
                limit: 144,
                actual: 145
            })
        ));
        assert!(matches!(
            check_content("   ", MAX_POST_LENGTH, "Post"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let accented = "é".repeat(144);
        assert!(accented.len() > 144);
        assert!(check_content(&accented, MAX_POST_LENGTH, "Post").is_ok());
    }

    #[tokio::test]
    async fn test_resolve_authors_flags_dangling_ids() {
        let store = memory_store();
        let alice = user(&store, "alice").await;

        let authors = resolve_authors(&*store, [alice.id, alice.id])
            .await
            .unwrap();
        assert_eq!(authors.len(), 1);

        let err = resolve_authors(&*store, [alice.id, 9_999])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }
}
