use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::error::Result;
use crate::handlers::AppState;
use crate::middleware::UserId;
use crate::models::UserSummary;
use crate::services::social::ProfileEdit;

pub async fn follow(
    state: web::Data<AppState>,
    user_id: UserId,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let username = username.into_inner();
    state.social.follow(user_id.0, &username, Utc::now()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "following": username,
    })))
}

pub async fn unfollow(
    state: web::Data<AppState>,
    user_id: UserId,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let username = username.into_inner();
    state.social.unfollow(user_id.0, &username, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "unfollowed": username,
    })))
}

pub async fn profile(
    state: web::Data<AppState>,
    user_id: UserId,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let profile = state.social.profile(user_id.0, &username).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn update_profile(
    state: web::Data<AppState>,
    user_id: UserId,
    req: web::Json<ProfileEdit>,
) -> Result<HttpResponse> {
    let user = state.social.update_profile(user_id.0, req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserSummary::from(&user)))
}

pub async fn followers(
    state: web::Data<AppState>,
    _user: UserId,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let users = state.social.followers(&username).await?;
    Ok(HttpResponse::Ok().json(users))
}

pub async fn following(
    state: web::Data<AppState>,
    _user: UserId,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let users = state.social.following(&username).await?;
    Ok(HttpResponse::Ok().json(users))
}
