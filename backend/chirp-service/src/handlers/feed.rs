use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::handlers::AppState;
use crate::middleware::{UserId, Viewer};
use crate::models::{TimelinePage, TrendingTag, UserSummary};
use crate::services::timeline::{decode_cursor, PageRequest};

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl FeedQueryParams {
    pub(crate) fn offset(&self) -> Result<usize> {
        match &self.cursor {
            Some(cursor) => decode_cursor(cursor),
            None => Ok(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Sidebar {
    pub trending_hashtags: Vec<TrendingTag>,
    pub newest_users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    #[serde(flatten)]
    pub page: TimelinePage,
    pub sidebar: Sidebar,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Home timeline plus the trending/newest-users sidebar
pub async fn get_feed(
    state: web::Data<AppState>,
    viewer: Viewer,
    query: web::Query<FeedQueryParams>,
) -> Result<HttpResponse> {
    let page = PageRequest {
        offset: query.offset()?,
        limit: state.feed.page_limit(query.limit),
    };
    debug!(viewer = ?viewer.0, offset = page.offset, limit = page.limit, "Feed request");

    let (page, trending_hashtags, newest_users) = tokio::try_join!(
        state.timeline.build_timeline(viewer.0, page, Utc::now()),
        state.trending.trending(),
        async {
            let users = state.store.newest_users(state.feed.newest_users_limit).await?;
            Ok::<_, AppError>(users.iter().map(UserSummary::from).collect::<Vec<_>>())
        },
    )?;

    Ok(HttpResponse::Ok().json(FeedResponse {
        page,
        sidebar: Sidebar {
            trending_hashtags,
            newest_users,
        },
    }))
}

pub async fn trending(state: web::Data<AppState>) -> Result<HttpResponse> {
    let tags = state.trending.trending().await?;
    Ok(HttpResponse::Ok().json(tags))
}

/// Visible posts carrying the tag, newest first
pub async fn hashtag(
    state: web::Data<AppState>,
    _user: UserId,
    tag: web::Path<String>,
) -> Result<HttpResponse> {
    let tag = tag.into_inner();
    let posts = state.trending.tagged_posts(&tag).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tag": tag.trim_start_matches('#'),
        "posts": posts,
    })))
}

pub async fn search(
    state: web::Data<AppState>,
    _user: UserId,
    query: web::Query<SearchParams>,
) -> Result<HttpResponse> {
    let results = state.search.search(&query.q).await?;
    Ok(HttpResponse::Ok().json(results))
}
