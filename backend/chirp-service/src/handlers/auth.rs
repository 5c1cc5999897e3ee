use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::error::Result;
use crate::handlers::AppState;
use crate::models::UserSummary;
use crate::services::accounts::{LoginRequest, RegisterRequest};

/// Create an account
pub async fn register(
    state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let user = state.accounts.register(req.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Created().json(UserSummary::from(&user)))
}

/// Exchange credentials for a bearer token
pub async fn login(
    state: web::Data<AppState>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let token = state.accounts.login(req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(token))
}
