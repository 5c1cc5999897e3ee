//! User and hashtag search

use serde::Serialize;
use std::sync::Arc;

use super::{post_views, sort_newest_first};
use crate::db::ContentStore;
use crate::error::{AppError, Result};
use crate::models::{PostView, UserSummary};

pub const MAX_QUERY_LENGTH: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub users: Vec<UserSummary>,
    pub posts: Vec<PostView>,
}

pub struct SearchService {
    store: Arc<dyn ContentStore>,
    user_limit: i64,
}

impl SearchService {
    pub fn new(store: Arc<dyn ContentStore>, user_limit: i64) -> Self {
        Self { store, user_limit }
    }

    /// Users whose name contains `query` and visible posts containing `#query`
    ///
    /// Both matches ignore case.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        let query = query.trim().trim_start_matches('#');
        if query.is_empty() {
            return Err(AppError::Validation("Search query cannot be empty".to_string()));
        }
        if query.chars().count() > MAX_QUERY_LENGTH {
            return Err(AppError::Validation(format!(
                "Search query must be at most {} characters",
                MAX_QUERY_LENGTH
            )));
        }

        let tag = format!("#{}", query);
        let (users, mut posts) = tokio::try_join!(
            self.store.search_users(query, self.user_limit),
            self.store.visible_posts_containing(&tag, true),
        )?;
        sort_newest_first(&mut posts);

        Ok(SearchResults {
            query: query.to_string(),
            users: users.iter().map(UserSummary::from).collect(),
            posts: post_views(&*self.store, posts).await?,
        })
    }
}
