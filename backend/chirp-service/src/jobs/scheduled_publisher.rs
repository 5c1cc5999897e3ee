//! Scheduled Post Publisher Background Job
//!
//! Posts submitted with a future `scheduled_at` are stored with no
//! `published_at` and stay out of every feed. Each sweep stamps the ones
//! whose instant has passed, then notifies users mentioned in them.
//!
//! A row that fails is logged and retried on the next sweep; the loop
//! itself only stops on shutdown.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::db::ContentStore;
use crate::metrics::publisher as metrics;
use crate::services::mentions;

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub published: usize,
    pub failed: usize,
}

pub struct ScheduledPublisher {
    store: Arc<dyn ContentStore>,
    interval: Duration,
}

impl ScheduledPublisher {
    pub fn new(store: Arc<dyn ContentStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Sweep until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Starting scheduled post publisher"
        );

        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Scheduled post publisher shutting down");
                    break;
                }
            }
        }
    }

    /// Publish every post due at `now`
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let cycle_start = Instant::now();

        let due = match self.store.due_scheduled_posts(now).await {
            Ok(ids) => ids,
            Err(e) => {
                metrics::record_run("error");
                metrics::record_duration(cycle_start.elapsed());
                tracing::error!(error = %e, "Failed to list due scheduled posts");
                return SweepReport::default();
            }
        };
        metrics::set_due_posts(due.len());

        let mut report = SweepReport::default();
        for post_id in due {
            match self.store.publish_post(post_id, now).await {
                Ok(true) => {
                    report.published += 1;
                    tracing::info!(post_id, "Scheduled post published");
                    self.notify_mentions(post_id, now).await;
                }
                // Already stamped by a previous or concurrent sweep
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(post_id, error = %e, "Failed to publish scheduled post");
                }
            }
        }

        metrics::record_posts("published", report.published);
        metrics::record_posts("failed", report.failed);
        metrics::record_run("success");
        metrics::record_duration(cycle_start.elapsed());

        if report.published > 0 || report.failed > 0 {
            tracing::info!(
                published = report.published,
                failed = report.failed,
                duration_ms = cycle_start.elapsed().as_millis(),
                "Scheduled post sweep completed"
            );
        }
        report
    }

    async fn notify_mentions(&self, post_id: i64, now: DateTime<Utc>) {
        let post = match self.store.post_by_id(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(post_id, error = %e, "Failed to load published post");
                return;
            }
        };
        match self.store.user_by_id(post.user_id).await {
            Ok(Some(author)) => {
                mentions::notify_mentions(&*self.store, &author, &post.content, now).await;
            }
            Ok(None) => tracing::warn!(post_id, user_id = post.user_id, "Published post has no author"),
            Err(e) => tracing::warn!(post_id, error = %e, "Failed to load post author"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::*;

    #[tokio::test]
    async fn test_publishes_only_due_posts() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let due = scheduled_post(&store, &alice, "morning", t0(), mins(10)).await;
        let later = scheduled_post(&store, &alice, "evening", t0(), mins(60)).await;
        let publisher = ScheduledPublisher::new(store.clone(), Duration::from_secs(60));

        assert_eq!(publisher.run_once(mins(5)).await, SweepReport::default());
        assert!(store.visible_posts().await.unwrap().is_empty());

        let report = publisher.run_once(mins(10)).await;
        assert_eq!(report.published, 1);
        let visible = store.visible_posts().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, due.id);
        assert_eq!(visible[0].published_at, Some(mins(10)));

        let hidden = store.post_by_id(later.id).await.unwrap().unwrap();
        assert!(hidden.published_at.is_none());
    }

    #[tokio::test]
    async fn test_second_sweep_does_not_restamp() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let post = scheduled_post(&store, &alice, "once", t0(), mins(1)).await;
        let publisher = ScheduledPublisher::new(store.clone(), Duration::from_secs(60));

        assert_eq!(publisher.run_once(mins(2)).await.published, 1);
        assert_eq!(publisher.run_once(mins(3)).await.published, 0);
        let stored = store.post_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(stored.published_at, Some(mins(2)));
    }

    #[tokio::test]
    async fn test_row_failure_does_not_block_others() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let broken = scheduled_post(&store, &alice, "broken", t0(), mins(1)).await;
        let fine = scheduled_post(&store, &alice, "fine", t0(), mins(1)).await;
        store.fail_publish_for(broken.id);
        let publisher = ScheduledPublisher::new(store.clone(), Duration::from_secs(60));

        let report = publisher.run_once(mins(2)).await;
        assert_eq!(report, SweepReport { published: 1, failed: 1 });
        assert!(store.post_by_id(fine.id).await.unwrap().unwrap().is_visible());
        assert!(!store.post_by_id(broken.id).await.unwrap().unwrap().is_visible());

        store.clear_publish_failures();
        let retry = publisher.run_once(mins(3)).await;
        assert_eq!(retry, SweepReport { published: 1, failed: 0 });
        assert!(store.post_by_id(broken.id).await.unwrap().unwrap().is_visible());
    }

    #[tokio::test]
    async fn test_mentions_notified_on_publish() {
        let store = memory_store();
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        scheduled_post(&store, &alice, "hey @bob", t0(), mins(1)).await;
        let publisher = ScheduledPublisher::new(store.clone(), Duration::from_secs(60));

        assert!(store.notifications_for(bob.id).await.unwrap().is_empty());
        publisher.run_once(mins(1)).await;
        let notes = store.notifications_for(bob.id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "alice mentioned you");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = memory_store();
        let publisher = ScheduledPublisher::new(store.clone(), Duration::from_secs(3600));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(publisher.run(rx));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("publisher did not stop")
            .unwrap();
    }
}
