//! Post, repost, quote and bookmark endpoints

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;
use crate::handlers::AppState;
use crate::middleware::UserId;
use crate::services::posting::Submission;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    pub image_key: Option<String>,
    /// RFC 3339 instant; a future value hides the post until then
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub content: String,
}

/// Publish, schedule or route a submission as a direct message
pub async fn create_tweet(
    state: web::Data<AppState>,
    user_id: UserId,
    req: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let outcome = state
        .posting
        .submit(
            user_id.0,
            Submission {
                content: req.content,
                image_key: req.image_key,
                scheduled_at: req.scheduled_at,
            },
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Created().json(outcome))
}

pub async fn retweet(
    state: web::Data<AppState>,
    user_id: UserId,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let repost = state
        .posting
        .repost(user_id.0, post_id.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(repost))
}

pub async fn quote(
    state: web::Data<AppState>,
    user_id: UserId,
    post_id: web::Path<i64>,
    req: web::Json<QuoteRequest>,
) -> Result<HttpResponse> {
    let quote = state
        .posting
        .quote(user_id.0, post_id.into_inner(), &req.content, Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(quote))
}

/// The post a quote would embed
pub async fn quote_target(
    state: web::Data<AppState>,
    _user: UserId,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let post = state.posting.quote_target(post_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn bookmark(
    state: web::Data<AppState>,
    user_id: UserId,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let bookmark = state
        .bookmarks
        .bookmark(user_id.0, post_id.into_inner(), Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(bookmark))
}

pub async fn bookmarks(state: web::Data<AppState>, user_id: UserId) -> Result<HttpResponse> {
    let entries = state.bookmarks.bookmarks(user_id.0).await?;
    Ok(HttpResponse::Ok().json(entries))
}
