use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::error::Result;
use crate::handlers::AppState;
use crate::middleware::{UserId, Viewer};
use crate::services::polls::PollDraft;

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub duration_days: i32,
    #[serde(default)]
    pub duration_hours: i32,
    #[serde(default)]
    pub duration_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option_id: Option<i64>,
}

pub async fn create_poll(
    state: web::Data<AppState>,
    user_id: UserId,
    req: web::Json<CreatePollRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let poll = state
        .polls
        .create_poll(
            user_id.0,
            PollDraft {
                question: req.question,
                options: req.options,
                duration_days: req.duration_days,
                duration_hours: req.duration_hours,
                duration_minutes: req.duration_minutes,
            },
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Created().json(poll))
}

/// Cast a vote; an empty body counts as no selection
pub async fn vote_poll(
    state: web::Data<AppState>,
    user_id: UserId,
    poll_id: web::Path<i64>,
    req: Option<web::Json<VoteRequest>>,
) -> Result<HttpResponse> {
    let option_id = req.and_then(|r| r.option_id);
    let vote = state
        .polls
        .vote(poll_id.into_inner(), option_id, user_id.0, Utc::now())
        .await?;
    Ok(HttpResponse::Created().json(vote))
}

pub async fn get_poll(
    state: web::Data<AppState>,
    viewer: Viewer,
    poll_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let poll = state
        .polls
        .poll_view(poll_id.into_inner(), viewer.0, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(poll))
}
