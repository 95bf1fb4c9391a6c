//! Background sweep: publish due scheduled posts and refresh expiring tokens

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::LifecycleError;
use super::publisher::Publisher;
use super::tokens::{RefreshSweep, TokenManager};
use crate::domain::social::PostStatus;
use crate::store::DataStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub posts_published: usize,
    pub posts_failed: usize,
    /// Due posts another caller had already claimed
    pub posts_skipped: usize,
    pub tokens: RefreshSweep,
}

pub struct Scheduler {
    store: Arc<dyn DataStore>,
    publisher: Arc<Publisher>,
    tokens: Arc<TokenManager>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn DataStore>,
        publisher: Arc<Publisher>,
        tokens: Arc<TokenManager>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            tokens,
            interval,
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary, LifecycleError> {
        let mut summary = CycleSummary::default();

        for post_id in self.store.due_scheduled_posts(now).await? {
            match self.publisher.publish(post_id, None).await {
                Ok(report) if report.status == PostStatus::Published => summary.posts_published += 1,
                Ok(_) => summary.posts_failed += 1,
                Err(LifecycleError::PublishConflict { .. }) => summary.posts_skipped += 1,
                Err(e) => {
                    tracing::error!(post_id, error = %e, "scheduled publish failed");
                    summary.posts_failed += 1;
                }
            }
        }

        summary.tokens = self.tokens.refresh_expiring(now).await?;
        Ok(summary)
    }

    /// Run cycles on a fixed interval until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.run_cycle(Utc::now()).await {
                Ok(summary) if summary != CycleSummary::default() => {
                    tracing::info!(
                        published = summary.posts_published,
                        failed = summary.posts_failed,
                        skipped = summary.posts_skipped,
                        tokens_refreshed = summary.tokens.refreshed,
                        token_refresh_failures = summary.tokens.failed,
                        tokens_expired = summary.tokens.skipped_expired,
                        "scheduler cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "scheduler cycle failed"),
            }
        }

        tracing::info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::social::{MediaItem, NewSocialPost, PostType, Provider};
    use crate::services::publisher::PublishSettings;
    use crate::services::testing::{FakePlatform, connect_account};
    use crate::store::{InMemoryStore, PostStore};

    #[tokio::test]
    async fn test_cycle_publishes_due_posts_and_refreshes_tokens() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let tokens = Arc::new(TokenManager::new(store.clone(), platform.clone()));
        let publisher = Arc::new(Publisher::new(
            store.clone(),
            platform.clone(),
            tokens.clone(),
            PublishSettings::default(),
        ));
        let scheduler = Scheduler::new(store.clone(), publisher, tokens, Duration::from_secs(60));

        let account = connect_account(&store, Provider::Facebook, "Acme", Some(30)).await;
        connect_account(&store, Provider::Facebook, "Stale", Some(3)).await;
        let now = Utc::now();
        let due = store.insert_social_post(NewSocialPost {
            user_id: 1,
            caption: "Due".to_string(),
            post_type: PostType::Post,
            media: vec![MediaItem::image("https://cdn.example.com/a.jpg")],
            status: PostStatus::Scheduled,
            scheduled_at: Some(now - chrono::Duration::minutes(5)),
        });
        let later = store.insert_social_post(NewSocialPost {
            user_id: 1,
            caption: "Later".to_string(),
            post_type: PostType::Post,
            media: vec![MediaItem::image("https://cdn.example.com/b.jpg")],
            status: PostStatus::Scheduled,
            scheduled_at: Some(now + chrono::Duration::hours(1)),
        });
        store.link_account(due.id, account.id);
        store.link_account(later.id, account.id);

        let summary = scheduler.run_cycle(now).await.unwrap();

        assert_eq!(summary.posts_published, 1);
        assert_eq!(summary.tokens.refreshed, 1);
        let due = store.get_social_post(due.id).await.unwrap().unwrap();
        let later = store.get_social_post(later.id).await.unwrap().unwrap();
        assert_eq!(due.status, PostStatus::Published);
        assert_eq!(later.status, PostStatus::Scheduled);

        let again = scheduler.run_cycle(now).await.unwrap();
        assert_eq!(again, CycleSummary::default());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let tokens = Arc::new(TokenManager::new(store.clone(), platform.clone()));
        let publisher = Arc::new(Publisher::new(
            store.clone(),
            platform,
            tokens.clone(),
            PublishSettings::default(),
        ));
        let scheduler = Scheduler::new(store, publisher, tokens, Duration::from_millis(10));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(shutdown.clone()));
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
