//! Timeline aggregation
//!
//! Builds the home feed by pulling every visible post, repost, quote and
//! poll from the store, normalizing each row into a `FeedItem`, ordering
//! the merged list, and hydrating only the requested page:
//!
//! 1. fetch the four sources concurrently
//! 2. normalize; reposts and quotes embed their original post
//! 3. sort newest first (id desc, then kind, on ties)
//! 4. slice the page
//! 5. attach poll options and the viewer's vote state in two bulk queries
//! 6. resolve every author, including embedded originals, in one bulk query
//!
//! A dangling reference fails the whole request; the feed is never
//! silently partial.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::db::ContentStore;
use crate::error::{AppError, Result};
use crate::metrics::feed as metrics;
use crate::models::{
    EmbeddedPost, FeedItem, FeedItemKind, Poll, PollOption, Post, QuotePost, Repost,
    TimelineEntry, TimelinePage, UserSummary,
};

/// Offset window into the ordered feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Everything from the start; used where no paging is wanted
    pub fn unbounded() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

pub fn encode_cursor(offset: usize) -> String {
    general_purpose::STANDARD.encode(offset.to_string())
}

pub fn decode_cursor(cursor: &str) -> Result<usize> {
    let decoded = general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| AppError::Validation("Invalid cursor format".to_string()))?;

    let offset_str = String::from_utf8(decoded)
        .map_err(|_| AppError::Validation("Invalid cursor encoding".to_string()))?;

    offset_str
        .parse::<usize>()
        .map_err(|_| AppError::Validation("Invalid cursor value".to_string()))
}

pub struct TimelineService {
    store: Arc<dyn ContentStore>,
}

impl TimelineService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn build_timeline(
        &self,
        viewer: Option<i64>,
        page: PageRequest,
        now: DateTime<Utc>,
    ) -> Result<TimelinePage> {
        let started = Instant::now();
        let result = self.build(viewer, page, now).await;
        metrics::observe_timeline(
            started.elapsed(),
            if result.is_ok() { "success" } else { "error" },
        );
        result
    }

    async fn build(
        &self,
        viewer: Option<i64>,
        page: PageRequest,
        now: DateTime<Utc>,
    ) -> Result<TimelinePage> {
        let store = &*self.store;
        let (posts, reposts, quotes, polls) = tokio::try_join!(
            store.visible_posts(),
            store.reposts(),
            store.quote_posts(),
            store.polls(),
        )?;

        let mut items = normalize(&posts, &reposts, &quotes, &polls, now)?;
        items.sort_by(FeedItem::feed_order);

        let total_count = items.len();
        let end = page.offset.saturating_add(page.limit).min(total_count);
        let mut page_items: Vec<FeedItem> = if page.offset < total_count {
            items.drain(page.offset..end).collect()
        } else {
            Vec::new()
        };
        let has_more = end < total_count;
        metrics::observe_page_size(page_items.len());

        debug!(
            viewer = ?viewer,
            total = total_count,
            offset = page.offset,
            returned = page_items.len(),
            "Timeline assembled"
        );

        self.attach_poll_state(&mut page_items, viewer).await?;

        let author_ids = page_items
            .iter()
            .flat_map(|item| std::iter::once(item.author_id).chain(item.kind.original_author_id()));
        let authors = super::resolve_authors(store, author_ids).await?;

        let entries = page_items
            .into_iter()
            .map(|item| {
                let author = lookup(&authors, item.author_id)?;
                let original_author = item
                    .kind
                    .original_author_id()
                    .map(|id| lookup(&authors, id))
                    .transpose()?;
                Ok(TimelineEntry {
                    item,
                    author,
                    original_author,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let cursor = (has_more && !entries.is_empty())
            .then(|| encode_cursor(page.offset + entries.len()));

        Ok(TimelinePage {
            items: entries,
            cursor,
            has_more,
            total_count,
        })
    }

    /// Fill options and `has_voted` for poll items on the page
    async fn attach_poll_state(&self, items: &mut [FeedItem], viewer: Option<i64>) -> Result<()> {
        let poll_ids: Vec<i64> = items
            .iter()
            .filter(|item| matches!(item.kind, FeedItemKind::Poll { .. }))
            .map(|item| item.id)
            .collect();
        if poll_ids.is_empty() {
            return Ok(());
        }

        let mut options_by_poll: HashMap<i64, Vec<PollOption>> = HashMap::new();
        for option in self.store.options_for_polls(&poll_ids).await? {
            options_by_poll.entry(option.poll_id).or_default().push(option);
        }

        let voted: HashSet<i64> = match viewer {
            Some(user_id) => self
                .store
                .voted_poll_ids(user_id, &poll_ids)
                .await?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };

        for item in items.iter_mut() {
            if let FeedItemKind::Poll {
                options, has_voted, ..
            } = &mut item.kind
            {
                *options = options_by_poll.remove(&item.id).unwrap_or_default();
                *has_voted = voted.contains(&item.id);
            }
        }
        Ok(())
    }
}

fn lookup(authors: &HashMap<i64, UserSummary>, id: i64) -> Result<UserSummary> {
    authors
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::Integrity(format!("author {} could not be resolved", id)))
}

/// Turn stored rows into unsorted feed items
///
/// Poll options and vote state are left empty here and filled per page.
fn normalize(
    posts: &[Post],
    reposts: &[Repost],
    quotes: &[QuotePost],
    polls: &[Poll],
    now: DateTime<Utc>,
) -> Result<Vec<FeedItem>> {
    let visible: HashMap<i64, &Post> = posts
        .iter()
        .filter(|p| p.is_visible())
        .map(|p| (p.id, p))
        .collect();

    let embed = |source: &str, id: i64, post_id: i64| -> Result<EmbeddedPost> {
        visible
            .get(&post_id)
            .and_then(|p| EmbeddedPost::from_post(p))
            .ok_or_else(|| {
                AppError::Integrity(format!(
                    "{} {} references unavailable post {}",
                    source, id, post_id
                ))
            })
    };

    let mut items = Vec::with_capacity(visible.len() + reposts.len() + quotes.len() + polls.len());

    for post in visible.values() {
        // filtered above, so published_at is set
        let timestamp = post.published_at.unwrap_or(post.created_at);
        items.push(FeedItem {
            id: post.id,
            kind: FeedItemKind::Post {
                image_key: post.image_key.clone(),
            },
            content: post.content.clone(),
            timestamp,
            author_id: post.user_id,
        });
    }

    for repost in reposts {
        let original = embed("repost", repost.id, repost.post_id)?;
        items.push(FeedItem {
            id: repost.id,
            content: original.content.clone(),
            kind: FeedItemKind::Repost { original },
            timestamp: repost.created_at,
            author_id: repost.user_id,
        });
    }

    for quote in quotes {
        let original = embed("quote", quote.id, quote.post_id)?;
        items.push(FeedItem {
            id: quote.id,
            content: quote.content.clone(),
            kind: FeedItemKind::Quote { original },
            timestamp: quote.created_at,
            author_id: quote.user_id,
        });
    }

    for poll in polls {
        items.push(FeedItem {
            id: poll.id,
            content: poll.question.clone(),
            kind: FeedItemKind::Poll {
                expires_at: poll.expires_at(),
                is_active: poll.is_active(now),
                options: Vec::new(),
                has_voted: false,
            },
            timestamp: poll.created_at,
            author_id: poll.user_id,
        });
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryContentStore, NewPoll, NewPost};
    use crate::services::test_support::*;

    fn service(store: &Arc<MemoryContentStore>) -> TimelineService {
        TimelineService::new(store.clone())
    }

    async fn poll(store: &MemoryContentStore, author_id: i64, at: DateTime<Utc>) -> (Poll, Vec<PollOption>) {
        store
            .create_poll(&NewPoll {
                user_id: author_id,
                question: "Best editor?".to_string(),
                created_at: at,
                duration_days: 1,
                duration_hours: 0,
                duration_minutes: 0,
                options: vec!["vim".to_string(), "emacs".to_string()],
            })
            .await
            .unwrap()
    }

    fn kinds(page: &TimelinePage) -> Vec<&'static str> {
        page.items.iter().map(|e| e.item.kind.as_str()).collect()
    }

    #[tokio::test]
    async fn test_newest_first_scenario() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let first = published_post(&store, &alice, "hello #test", mins(0)).await;
        let second = published_post(&store, &bob, "#test again #test", mins(1)).await;

        let page = service(&store)
            .build_timeline(None, PageRequest::unbounded(), mins(2))
            .await
            .unwrap();

        let ids: Vec<i64> = page.items.iter().map(|e| e.item.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(page.items[0].author.username, "bob");
        assert_eq!(page.total_count, 2);
        assert!(!page.has_more);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_one_item_per_visible_row() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let original = published_post(&store, &alice, "original", mins(0)).await;
        scheduled_post(&store, &alice, "not yet", mins(0), mins(120)).await;
        store.create_repost(bob.id, original.id, mins(1)).await.unwrap();
        store
            .create_quote(bob.id, original.id, "so true", mins(2))
            .await
            .unwrap();
        poll(&store, alice.id, mins(3)).await;

        let page = service(&store)
            .build_timeline(None, PageRequest::unbounded(), mins(4))
            .await
            .unwrap();

        assert_eq!(page.total_count, 4);
        assert_eq!(kinds(&page), vec!["poll", "quote", "repost", "post"]);
        assert!(page.items.iter().all(|e| e.item.content != "not yet"));
    }

    #[tokio::test]
    async fn test_repost_semantics() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let original = published_post(&store, &alice, "worth sharing", mins(0)).await;
        store.create_repost(bob.id, original.id, mins(30)).await.unwrap();

        let page = service(&store)
            .build_timeline(None, PageRequest::unbounded(), mins(31))
            .await
            .unwrap();

        let repost = &page.items[0];
        assert_eq!(repost.item.kind.as_str(), "repost");
        assert_eq!(repost.item.content, "worth sharing");
        assert_eq!(repost.item.timestamp, mins(30));
        assert_eq!(repost.author.username, "bob");
        assert_eq!(
            repost.original_author.as_ref().map(|u| u.username.as_str()),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_ties_break_by_id_then_kind() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let a = published_post(&store, &alice, "a", mins(5)).await;
        let b = published_post(&store, &alice, "b", mins(5)).await;

        let page = service(&store)
            .build_timeline(None, PageRequest::unbounded(), mins(6))
            .await
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|e| e.item.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_ordering_property_holds() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        for (i, minute) in [7, 3, 9, 1, 3, 8].iter().enumerate() {
            let author = if i % 2 == 0 { &alice } else { &bob };
            let post = published_post(&store, author, &format!("post {}", i), mins(*minute)).await;
            if i % 3 == 0 {
                store.create_repost(bob.id, post.id, mins(*minute + 2)).await.unwrap();
            }
        }
        poll(&store, alice.id, mins(4)).await;

        let page = service(&store)
            .build_timeline(Some(bob.id), PageRequest::unbounded(), mins(20))
            .await
            .unwrap();
        for pair in page.items.windows(2) {
            assert!(pair[0].item.timestamp >= pair[1].item.timestamp);
        }
    }

    #[tokio::test]
    async fn test_idempotent() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let post = published_post(&store, &alice, "same #again", mins(0)).await;
        store.create_repost(alice.id, post.id, mins(0)).await.unwrap();
        poll(&store, alice.id, mins(0)).await;

        let svc = service(&store);
        let first = svc
            .build_timeline(Some(alice.id), PageRequest::unbounded(), mins(1))
            .await
            .unwrap();
        let second = svc
            .build_timeline(Some(alice.id), PageRequest::unbounded(), mins(1))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_pages_concatenate_to_full_feed() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        for i in 0..7 {
            published_post(&store, &alice, &format!("post {}", i), mins(i)).await;
        }
        poll(&store, alice.id, mins(3)).await;

        let svc = service(&store);
        let full = svc
            .build_timeline(None, PageRequest::unbounded(), mins(10))
            .await
            .unwrap();

        let mut collected = Vec::new();
        let mut offset = 0;
        loop {
            let page = svc
                .build_timeline(None, PageRequest { offset, limit: 3 }, mins(10))
                .await
                .unwrap();
            collected.extend(page.items.clone());
            match page.cursor {
                Some(cursor) => offset = decode_cursor(&cursor).unwrap(),
                None => {
                    assert!(!page.has_more);
                    break;
                }
            }
        }
        assert_eq!(collected, full.items);
        assert_eq!(full.total_count, 8);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        published_post(&store, &alice, "only", mins(0)).await;

        let page = service(&store)
            .build_timeline(None, PageRequest { offset: 10, limit: 5 }, mins(1))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn test_poll_vote_state_per_viewer() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let (p, options) = poll(&store, alice.id, mins(0)).await;
        store
            .record_vote(p.id, options[0].id, bob.id, mins(1))
            .await
            .unwrap();

        let svc = service(&store);
        let poll_state = |page: &TimelinePage| match &page.items[0].item.kind {
            FeedItemKind::Poll {
                options,
                has_voted,
                is_active,
                ..
            } => (options.iter().map(|o| o.votes).collect::<Vec<_>>(), *has_voted, *is_active),
            other => panic!("expected poll, got {:?}", other),
        };

        let as_bob = svc
            .build_timeline(Some(bob.id), PageRequest::unbounded(), mins(2))
            .await
            .unwrap();
        assert_eq!(poll_state(&as_bob), (vec![1, 0], true, true));

        let as_alice = svc
            .build_timeline(Some(alice.id), PageRequest::unbounded(), mins(2))
            .await
            .unwrap();
        assert_eq!(poll_state(&as_alice), (vec![1, 0], false, true));

        let anonymous = svc
            .build_timeline(None, PageRequest::unbounded(), mins(2))
            .await
            .unwrap();
        assert!(!poll_state(&anonymous).1);

        let after_expiry = svc
            .build_timeline(None, PageRequest::unbounded(), mins(60 * 24 + 1))
            .await
            .unwrap();
        assert!(!poll_state(&after_expiry).2);
    }

    #[tokio::test]
    async fn test_dangling_author_fails_request() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        published_post(&store, &alice, "fine", mins(0)).await;
        store
            .create_post(&NewPost {
                user_id: 4_242,
                content: "orphan".to_string(),
                image_key: None,
                created_at: mins(1),
                scheduled_at: None,
                published_at: Some(mins(1)),
            })
            .await
            .unwrap();

        let err = service(&store)
            .build_timeline(None, PageRequest::unbounded(), mins(2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_repost_of_unpublished_post_is_integrity_error() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let hidden = scheduled_post(&store, &alice, "later", mins(0), mins(90)).await;
        store.create_repost(alice.id, hidden.id, mins(1)).await.unwrap();

        let err = service(&store)
            .build_timeline(None, PageRequest::unbounded(), mins(2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[test]
    fn test_cursor_round_trip_and_garbage() {
        assert_eq!(decode_cursor(&encode_cursor(150)).unwrap(), 150);
        assert!(matches!(
            decode_cursor("!!not-base64!!"),
            Err(AppError::Validation(_))
        ));
        assert!(decode_cursor(&general_purpose::STANDARD.encode("minus")).is_err());
    }
}
