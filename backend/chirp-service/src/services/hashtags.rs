//! Hashtag extraction and trending ranking
//!
//! Trending recomputes from every visible post on each call. Tags are
//! case-sensitive: `#Rust` and `#rust` are counted separately.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use crate::db::ContentStore;
use crate::error::Result;
use crate::metrics::feed as metrics;
use crate::models::{PostView, TrendingTag};

/// `#` followed by one or more Unicode word characters
static HASHTAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+)").expect("Invalid hashtag regex"));

/// Extract tag names (without `#`) in order of appearance, duplicates kept
pub fn extract_hashtags(content: &str) -> Vec<&str> {
    HASHTAG_REGEX
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect()
}

/// Count tags across `contents` and return the `k` most frequent
///
/// Ties keep the order in which the tag was first seen.
pub fn rank_hashtags<'a, I>(contents: I, k: usize) -> Vec<TrendingTag>
where
    I: IntoIterator<Item = &'a str>,
{
    // tag -> (count, first-seen position)
    let mut counts: HashMap<&'a str, (usize, usize)> = HashMap::new();
    for content in contents {
        for tag in extract_hashtags(content) {
            let next_pos = counts.len();
            counts.entry(tag).or_insert((0, next_pos)).0 += 1;
        }
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(tag, (count, seen))| (tag, count, seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(k);

    ranked
        .into_iter()
        .map(|(tag, count, _)| TrendingTag {
            tag: tag.to_string(),
            count,
        })
        .collect()
}

pub struct TrendingService {
    store: Arc<dyn ContentStore>,
    limit: usize,
}

impl TrendingService {
    pub fn new(store: Arc<dyn ContentStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Top tags across all visible posts
    pub async fn trending(&self) -> Result<Vec<TrendingTag>> {
        let started = Instant::now();
        let posts = self.store.visible_posts().await?;
        let ranked = rank_hashtags(posts.iter().map(|p| p.content.as_str()), self.limit);
        metrics::observe_trending(started.elapsed(), posts.len());
        Ok(ranked)
    }

    /// Visible posts carrying exactly `tag`, newest first
    pub async fn tagged_posts(&self, tag: &str) -> Result<Vec<PostView>> {
        let tag = tag.trim_start_matches('#');
        let mut posts = self
            .store
            .visible_posts_containing(&format!("#{}", tag), false)
            .await?;
        posts.retain(|p| extract_hashtags(&p.content).contains(&tag));
        super::sort_newest_first(&mut posts);
        super::post_views(&*self.store, posts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    #[test]
    fn test_extract_hashtags() {
        assert_eq!(
            extract_hashtags("#rust is #fun, #rust_lang #2024"),
            vec!["rust", "fun", "rust_lang", "2024"]
        );
        assert!(extract_hashtags("no tags # here").is_empty());
        assert_eq!(extract_hashtags("#café au lait"), vec!["café"]);
    }

    #[test]
    fn test_extract_keeps_duplicates() {
        assert_eq!(extract_hashtags("#test again #test"), vec!["test", "test"]);
    }

    #[test]
    fn test_rank_by_count() {
        let posts = [
            "#a #b", "#b #c", "#a #b", "#b", "#a #b",
        ];
        let ranked = rank_hashtags(posts.iter().copied(), 5);
        let tags: Vec<(&str, usize)> = ranked.iter().map(|t| (t.tag.as_str(), t.count)).collect();
        assert_eq!(tags, vec![("b", 5), ("a", 3), ("c", 1)]);
    }

    #[test]
    fn test_rank_ties_keep_first_seen_order() {
        let ranked = rank_hashtags(["#z #y", "#x", "#y #z #x"], 5);
        let tags: Vec<&str> = ranked.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["z", "y", "x"]);
    }

    #[test]
    fn test_rank_truncates_and_is_case_sensitive() {
        let ranked = rank_hashtags(["#Rust #rust #rust", "#a #b #c #d #e #f"], 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].tag, "rust");
        assert_eq!(ranked[0].count, 2);
        assert_eq!(ranked[1].tag, "Rust");
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_hashtags(Vec::<&str>::new(), 5).is_empty());
        assert!(rank_hashtags(["#a"], 0).is_empty());
    }

    #[tokio::test]
    async fn test_trending_scenario_and_scheduled_exclusion() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        published_post(&store, &alice, "hello #test", mins(0)).await;
        published_post(&store, &bob, "#test again #test", mins(1)).await;
        scheduled_post(&store, &bob, "#hidden #hidden #hidden #hidden", mins(1), mins(60)).await;

        let service = TrendingService::new(store.clone(), 5);
        let trending = service.trending().await.unwrap();
        assert_eq!(
            trending,
            vec![TrendingTag {
                tag: "test".to_string(),
                count: 3
            }]
        );
    }

    #[tokio::test]
    async fn test_tagged_posts_exact_match() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let first = published_post(&store, &alice, "learning #rust", mins(0)).await;
        published_post(&store, &alice, "all about #rustacean life", mins(1)).await;
        let third = published_post(&store, &alice, "#rust again", mins(2)).await;
        published_post(&store, &alice, "#Rust shouting", mins(3)).await;

        let service = TrendingService::new(store.clone(), 5);
        let posts = service.tagged_posts("rust").await.unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.post.id).collect();
        assert_eq!(ids, vec![third.id, first.id]);
        assert_eq!(posts[0].author.username, "alice");
    }
}
