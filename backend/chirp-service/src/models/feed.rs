//! Feed shapes derived from stored rows
//!
//! A `FeedItem` is never persisted: the timeline builds one per visible
//! post, repost, quote and poll on every request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use super::{Post, PollOption, UserSummary};

/// Original post carried inside a repost or quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedPost {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub image_key: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl EmbeddedPost {
    /// None when the post has not been published yet
    pub fn from_post(post: &Post) -> Option<Self> {
        Some(Self {
            id: post.id,
            user_id: post.user_id,
            content: post.content.clone(),
            image_key: post.image_key.clone(),
            published_at: post.published_at?,
        })
    }
}

/// Per-variant payload of a feed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItemKind {
    Post {
        image_key: Option<String>,
    },
    Repost {
        original: EmbeddedPost,
    },
    Quote {
        original: EmbeddedPost,
    },
    Poll {
        expires_at: DateTime<Utc>,
        is_active: bool,
        options: Vec<PollOption>,
        has_voted: bool,
    },
}

impl FeedItemKind {
    /// Tie-break rank when timestamp and id are equal
    pub fn rank(&self) -> u8 {
        match self {
            FeedItemKind::Post { .. } => 0,
            FeedItemKind::Repost { .. } => 1,
            FeedItemKind::Quote { .. } => 2,
            FeedItemKind::Poll { .. } => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedItemKind::Post { .. } => "post",
            FeedItemKind::Repost { .. } => "repost",
            FeedItemKind::Quote { .. } => "quote",
            FeedItemKind::Poll { .. } => "poll",
        }
    }

    /// Author of the embedded original, if any
    pub fn original_author_id(&self) -> Option<i64> {
        match self {
            FeedItemKind::Repost { original } | FeedItemKind::Quote { original } => {
                Some(original.user_id)
            }
            _ => None,
        }
    }
}

/// One normalized entry of the timeline
///
/// `author_id` is always the acting user: poster, reposter, quoter or
/// poll creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: i64,
    #[serde(flatten)]
    pub kind: FeedItemKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: i64,
}

impl FeedItem {
    /// Newest first, then higher id, then post < repost < quote < poll
    pub fn feed_order(a: &FeedItem, b: &FeedItem) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
            .then_with(|| a.kind.rank().cmp(&b.kind.rank()))
    }
}

/// Feed item with its authors resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub item: FeedItem,
    pub author: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_author: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePage {
    pub items: Vec<TimelineEntry>,
    pub cursor: Option<String>,
    pub has_more: bool,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendingTag {
    pub tag: String,
    pub count: usize,
}
