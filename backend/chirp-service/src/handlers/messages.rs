//! Inbox, replies and notifications

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::error::Result;
use crate::handlers::AppState;
use crate::middleware::UserId;

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
}

pub async fn inbox(state: web::Data<AppState>, user_id: UserId) -> Result<HttpResponse> {
    let messages = state.messaging.inbox(user_id.0).await?;
    Ok(HttpResponse::Ok().json(messages))
}

pub async fn reply(
    state: web::Data<AppState>,
    user_id: UserId,
    message_id: web::Path<i64>,
    req: web::Json<ReplyRequest>,
) -> Result<HttpResponse> {
    let reply = state
        .messaging
        .reply(message_id.into_inner(), user_id.0, &req.content, Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(reply))
}

pub async fn notifications(state: web::Data<AppState>, user_id: UserId) -> Result<HttpResponse> {
    let notes = state.messaging.notifications(user_id.0).await?;
    Ok(HttpResponse::Ok().json(notes))
}

pub async fn mark_read(state: web::Data<AppState>, user_id: UserId) -> Result<HttpResponse> {
    let updated = state.messaging.mark_notifications_read(user_id.0).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "marked_read": updated })))
}
