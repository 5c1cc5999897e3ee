//! HTTP handlers for chirp-service
//!
//! Every route lives under `/api/v1` behind `JwtAuthMiddleware`. Handlers
//! that require a caller take `UserId`; the rest take `Viewer`.

pub mod auth;
pub mod feed;
pub mod health;
pub mod messages;
pub mod polls;
pub mod posts;
pub mod social;

use actix_web::web;
use crypto_core::jwt::TokenIssuer;
use std::sync::Arc;

use crate::config::FeedConfig;
use crate::db::ContentStore;
use crate::error::AppError;
use crate::metrics::serve_metrics;
use crate::middleware::JwtAuthMiddleware;
use crate::services::{
    AccountService, BookmarkService, MessagingService, PollService, PostingService,
    SearchService, SocialService, TimelineService, TrendingService,
};

/// Shared state handed to every handler through `web::Data`
pub struct AppState {
    pub store: Arc<dyn ContentStore>,
    pub issuer: Arc<TokenIssuer>,
    pub feed: FeedConfig,
    pub accounts: AccountService,
    pub timeline: TimelineService,
    pub trending: TrendingService,
    pub posting: PostingService,
    pub polls: PollService,
    pub social: SocialService,
    pub messaging: MessagingService,
    pub bookmarks: BookmarkService,
    pub search: SearchService,
}

impl AppState {
    pub fn new(store: Arc<dyn ContentStore>, issuer: Arc<TokenIssuer>, feed: FeedConfig) -> Self {
        Self {
            accounts: AccountService::new(store.clone(), issuer.clone()),
            timeline: TimelineService::new(store.clone()),
            trending: TrendingService::new(store.clone(), feed.trending_limit),
            posting: PostingService::new(store.clone()),
            polls: PollService::new(store.clone()),
            social: SocialService::new(store.clone()),
            messaging: MessagingService::new(store.clone()),
            bookmarks: BookmarkService::new(store.clone()),
            search: SearchService::new(store.clone(), feed.search_user_limit),
            store,
            issuer,
            feed,
        }
    }
}

/// Register all routes; the caller supplies `web::Data<AppState>`
pub fn configure(cfg: &mut web::ServiceConfig, issuer: Arc<TokenIssuer>) {
    cfg.route("/metrics", web::get().to(serve_metrics)).service(
        web::scope("/api/v1")
            .wrap(JwtAuthMiddleware::new(issuer))
            .app_data(web::JsonConfig::default().error_handler(|err, _| {
                AppError::Validation(format!("Invalid JSON body: {}", err)).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _| {
                AppError::Validation(format!("Invalid query string: {}", err)).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _| {
                AppError::NotFound(format!("Invalid path: {}", err)).into()
            }))
            .route("/health", web::get().to(health::health_summary))
            .route("/health/ready", web::get().to(health::readiness_summary))
            .route("/health/live", web::get().to(health::liveness_check))
            .route("/register", web::post().to(auth::register))
            .route("/login", web::post().to(auth::login))
            .route("/", web::get().to(feed::get_feed))
            .route("/feed", web::get().to(feed::get_feed))
            .route("/trending", web::get().to(feed::trending))
            .route("/hashtag/{tag}", web::get().to(feed::hashtag))
            .route("/search", web::get().to(feed::search))
            .route("/tweet", web::post().to(posts::create_tweet))
            .route("/retweet/{post_id}", web::post().to(posts::retweet))
            .route("/quote/{post_id}", web::post().to(posts::quote))
            .route("/quote/{post_id}", web::get().to(posts::quote_target))
            .route("/bookmark/{post_id}", web::post().to(posts::bookmark))
            .route("/bookmarks", web::get().to(posts::bookmarks))
            .route("/create_poll", web::post().to(polls::create_poll))
            .route("/vote_poll/{poll_id}", web::post().to(polls::vote_poll))
            .route("/polls/{poll_id}", web::get().to(polls::get_poll))
            .route("/follow/{username}", web::post().to(social::follow))
            .route("/unfollow/{username}", web::post().to(social::unfollow))
            .route("/profile", web::put().to(social::update_profile))
            .route("/profile/{username}", web::get().to(social::profile))
            .route("/followers/{username}", web::get().to(social::followers))
            .route("/following/{username}", web::get().to(social::following))
            .route("/messages", web::get().to(messages::inbox))
            .route("/reply/{message_id}", web::post().to(messages::reply))
            .route("/notifications", web::get().to(messages::notifications))
            .route("/notifications/read", web::post().to(messages::mark_read)),
    );
}
