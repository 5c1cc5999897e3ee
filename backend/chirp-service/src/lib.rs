//! Chirp Service Library
//!
//! A small Twitter-style social network: short posts, reposts and quotes,
//! polls, follows, direct messages, bookmarks, and a merged
//! reverse-chronological timeline with trending hashtags.
//!
//! # Modules
//!
//! - `handlers`: HTTP request handlers and route table
//! - `services`: Business logic (timeline aggregation, post routing, polls, ...)
//! - `db`: `ContentStore` trait with PostgreSQL and in-memory backends
//! - `models`: Row types and derived feed shapes
//! - `jobs`: Scheduled post publisher
//! - `middleware`: JWT authentication
//! - `error`: Error types and handling
//! - `config`: Configuration management
//! - `metrics`: Prometheus collectors
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
