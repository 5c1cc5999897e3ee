//! Bookmarks

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::post_views;
use crate::db::{ContentStore, StoreError};
use crate::error::{AppError, Result};
use crate::models::{Bookmark, Post, PostView};

#[derive(Debug, Clone, Serialize)]
pub struct BookmarkEntry {
    pub bookmark_id: i64,
    pub bookmarked_at: DateTime<Utc>,
    pub post: PostView,
}

pub struct BookmarkService {
    store: Arc<dyn ContentStore>,
}

impl BookmarkService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn bookmark(&self, user_id: i64, post_id: i64, now: DateTime<Utc>) -> Result<Bookmark> {
        let post = self
            .store
            .post_by_id(post_id)
            .await?
            .filter(Post::is_visible)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        let bookmark = match self.store.create_bookmark(user_id, post.id, now).await {
            Ok(bookmark) => bookmark,
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::Conflict("Post already bookmarked".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        info!(bookmark_id = bookmark.id, post_id, user_id, "Post bookmarked");
        Ok(bookmark)
    }

    /// The user's bookmarks with their posts, newest bookmark first
    pub async fn bookmarks(&self, user_id: i64) -> Result<Vec<BookmarkEntry>> {
        let bookmarks = self.store.bookmarks_for(user_id).await?;
        let ids: Vec<i64> = bookmarks.iter().map(|b| b.post_id).collect();
        let posts = self.store.posts_by_ids(&ids).await?;
        let views: HashMap<i64, PostView> = post_views(&*self.store, posts)
            .await?
            .into_iter()
            .map(|v| (v.post.id, v))
            .collect();

        bookmarks
            .into_iter()
            .map(|b| {
                let post = views.get(&b.post_id).cloned().ok_or_else(|| {
                    AppError::Integrity(format!("bookmark {} references missing post", b.id))
                })?;
                Ok(BookmarkEntry {
                    bookmark_id: b.id,
                    bookmarked_at: b.created_at,
                    post,
                })
            })
            .collect()
    }
}
