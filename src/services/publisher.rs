//! Multi-account publish orchestration
//!
//! A post moves `draft|scheduled|failed -> publishing -> published|failed`.
//! Each linked account is delivered to concurrently and writes only its own
//! join row; the post's terminal status is decided once every delivery is in.

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::LifecycleError;
use super::platform::{ContainerRequest, ContainerStatus, PlatformError, PublishingClient};
use super::tokens::TokenManager;
use crate::constants::{DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_SECS};
use crate::domain::Actor;
use crate::domain::audit::{self, AuditEvent, EntityType, SCHEDULER_ACTOR};
use crate::domain::social::{
    DeliveryOutcome, MediaKind, PlatformStatus, PostStatus, PostType, Provider, SocialAccount,
    SocialPost, SocialPostAccount,
};
use crate::store::{DataStore, record_audit};

#[derive(Debug, Clone, Copy)]
pub struct PublishSettings {
    /// Wait between container status checks
    pub poll_interval: Duration,
    /// Status checks before a container is declared stuck
    pub max_poll_attempts: u32,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

impl PublishSettings {
    /// Hard ceiling on one readiness wait, including slow status calls
    fn wait_budget(&self) -> Duration {
        self.poll_interval
            .saturating_mul(self.max_poll_attempts)
            .saturating_add(Duration::from_secs(30))
    }
}

/// Result of delivering a post to one account
#[derive(Debug, Clone, Serialize)]
pub struct AccountDelivery {
    pub post_account_id: i64,
    pub account_id: i64,
    pub provider: Option<Provider>,
    pub account_name: String,
    pub platform_status: PlatformStatus,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
}

impl AccountDelivery {
    fn label(&self) -> String {
        match self.provider {
            Some(provider) => format!("{} ({})", self.account_name, provider),
            None => self.account_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub post_id: i64,
    pub status: PostStatus,
    pub error_message: Option<String>,
    pub accounts: Vec<AccountDelivery>,
}

/// Decide a post's terminal status from its per-account results.
///
/// Partial success counts as published; the message names each failed account.
pub fn aggregate(deliveries: &[AccountDelivery]) -> (PostStatus, Option<String>) {
    if deliveries.is_empty() {
        return (PostStatus::Failed, Some("no linked accounts".to_string()));
    }

    let failures: Vec<String> = deliveries
        .iter()
        .filter_map(|d| d.error.as_ref().map(|e| format!("{}: {}", d.label(), e)))
        .collect();
    let total = deliveries.len();
    let succeeded = total - failures.len();

    if failures.is_empty() {
        (PostStatus::Published, None)
    } else if succeeded == 0 {
        (
            PostStatus::Failed,
            Some(format!("All {} accounts failed: {}", total, failures.join("; "))),
        )
    } else {
        (
            PostStatus::Published,
            Some(format!(
                "Published to {} of {} accounts; failed: {}",
                succeeded,
                total,
                failures.join("; ")
            )),
        )
    }
}

pub struct Publisher {
    store: Arc<dyn DataStore>,
    client: Arc<dyn PublishingClient>,
    tokens: Arc<TokenManager>,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn DataStore>,
        client: Arc<dyn PublishingClient>,
        tokens: Arc<TokenManager>,
        settings: PublishSettings,
    ) -> Self {
        Self {
            store,
            client,
            tokens,
            settings,
        }
    }

    pub async fn publish(
        &self,
        post_id: i64,
        initiated_by: Option<&Actor>,
    ) -> Result<PublishReport, LifecycleError> {
        self.publish_with_cancel(post_id, initiated_by, CancellationToken::new())
            .await
    }

    /// Publish a post to every linked account.
    ///
    /// Cancelling `cancel` ends any readiness wait early; the affected accounts
    /// fail and the post still reaches a terminal status.
    pub async fn publish_with_cancel(
        &self,
        post_id: i64,
        initiated_by: Option<&Actor>,
        cancel: CancellationToken,
    ) -> Result<PublishReport, LifecycleError> {
        let post = self
            .store
            .get_social_post(post_id)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "social post",
                id: post_id,
            })?;

        if !post.status.can_start_publish() {
            return Err(LifecycleError::PublishConflict {
                post_id,
                status: post.status,
            });
        }

        if !self.store.begin_publishing(post_id).await? {
            let status = self
                .store
                .get_social_post(post_id)
                .await?
                .map_or(PostStatus::Publishing, |p| p.status);
            return Err(LifecycleError::PublishConflict { post_id, status });
        }

        tracing::info!(post_id, post_type = post.post_type.as_str(), "publishing post");

        match self.run(&post, initiated_by, &cancel).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = format!("publishing aborted: {}", e);
                if let Err(settle_err) = self
                    .store
                    .finish_publishing(post_id, PostStatus::Failed, Some(&message))
                    .await
                {
                    tracing::error!(post_id, error = %settle_err, "failed to settle aborted publish");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        post: &SocialPost,
        initiated_by: Option<&Actor>,
        cancel: &CancellationToken,
    ) -> Result<PublishReport, LifecycleError> {
        let links = self.store.list_post_accounts(post.id).await?;
        self.store.mark_post_accounts_publishing(post.id).await?;

        let deliveries = join_all(
            links
                .iter()
                .map(|link| self.deliver_to_account(post, link, cancel)),
        )
        .await;

        let (status, error_message) = aggregate(&deliveries);
        self.store
            .finish_publishing(post.id, status, error_message.as_deref())
            .await?;

        let action = match status {
            PostStatus::Published => audit::POST_PUBLISHED,
            _ => audit::POST_FAILED,
        };
        let (actor, role) = match initiated_by {
            Some(actor) => (actor.label(), Some(actor.role)),
            None => (SCHEDULER_ACTOR.to_string(), None),
        };
        record_audit(
            self.store.as_ref(),
            AuditEvent::new(
                EntityType::SocialPost,
                post.id,
                action,
                actor,
                role,
                json!({
                    "status": status,
                    "error_message": error_message,
                    "accounts": deliveries,
                }),
            ),
        )
        .await;

        tracing::info!(
            post_id = post.id,
            status = status.as_str(),
            accounts = deliveries.len(),
            "publish finished"
        );

        Ok(PublishReport {
            post_id: post.id,
            status,
            error_message,
            accounts: deliveries,
        })
    }

    /// Deliver to one account and persist the outcome on its join row
    async fn deliver_to_account(
        &self,
        post: &SocialPost,
        link: &SocialPostAccount,
        cancel: &CancellationToken,
    ) -> AccountDelivery {
        let account = self.store.get_social_account(link.account_id).await;

        let result = match &account {
            Ok(Some(account)) => self
                .deliver(post, account, cancel)
                .await
                .map_err(|e| e.to_string()),
            Ok(None) => Err(format!("social account {} not found", link.account_id)),
            Err(e) => Err(e.to_string()),
        };

        let outcome = match result {
            Ok(platform_post_id) => DeliveryOutcome::Published { platform_post_id },
            Err(error) => DeliveryOutcome::Failed { error },
        };

        if let Err(e) = self.store.record_delivery(link.id, &outcome).await {
            tracing::error!(
                post_id = post.id,
                account_id = link.account_id,
                error = %e,
                "failed to record delivery outcome"
            );
        }

        let account = account.ok().flatten();
        let mut delivery = AccountDelivery {
            post_account_id: link.id,
            account_id: link.account_id,
            provider: account.as_ref().map(|a| a.provider),
            account_name: account
                .map(|a| a.account_name)
                .unwrap_or_else(|| format!("account {}", link.account_id)),
            platform_status: outcome.platform_status(),
            platform_post_id: None,
            error: None,
        };

        match outcome {
            DeliveryOutcome::Published { platform_post_id } => {
                tracing::info!(post_id = post.id, account_id = link.account_id, %platform_post_id, "delivered");
                delivery.platform_post_id = Some(platform_post_id);
            }
            DeliveryOutcome::Failed { error } => {
                tracing::warn!(post_id = post.id, account_id = link.account_id, %error, "delivery failed");
                delivery.error = Some(error);
            }
        }

        delivery
    }

    async fn deliver(
        &self,
        post: &SocialPost,
        account: &SocialAccount,
        cancel: &CancellationToken,
    ) -> Result<String, PlatformError> {
        let token = self.tokens.ensure_usable(account).await?;

        match account.provider {
            Provider::Facebook => {
                let page_id = account
                    .page_id
                    .as_deref()
                    .unwrap_or(&account.provider_account_id);
                self.client
                    .publish_page_post(&token, page_id, &post.caption, &post.media)
                    .await
            }
            Provider::Instagram => self.deliver_instagram(post, account, &token, cancel).await,
        }
    }

    /// Container flow: create, wait when video is involved, then publish.
    /// Video carousel children must finish before the parent is created.
    /// A non-carousel post with several items publishes its first item.
    async fn deliver_instagram(
        &self,
        post: &SocialPost,
        account: &SocialAccount,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PlatformError> {
        let business_id = account.provider_account_id.as_str();
        let caption = post.caption.as_str();

        let container_id = match post.media.as_slice() {
            [] => {
                return Err(PlatformError::Unsupported(
                    "Instagram posts need at least one image or video".to_string(),
                ));
            }
            items if post.post_type == PostType::Carousel && items.len() > 1 => {
                let mut children = Vec::with_capacity(items.len());
                for media in items {
                    let child = self
                        .client
                        .create_container(token, business_id, ContainerRequest::CarouselItem { media })
                        .await?;
                    if media.kind == MediaKind::Video {
                        self.wait_until_ready(token, &child, cancel).await?;
                    }
                    children.push(child);
                }

                let parent = self
                    .client
                    .create_container(
                        token,
                        business_id,
                        ContainerRequest::Carousel {
                            children: &children,
                            caption,
                        },
                    )
                    .await?;

                if items.iter().any(|m| m.kind == MediaKind::Video) {
                    self.wait_until_ready(token, &parent, cancel).await?;
                }
                parent
            }
            [media, ..] => {
                let container = self
                    .client
                    .create_container(token, business_id, ContainerRequest::Single { media, caption })
                    .await?;

                if media.kind == MediaKind::Video {
                    self.wait_until_ready(token, &container, cancel).await?;
                }
                container
            }
        };

        self.client
            .publish_container(token, business_id, &container_id)
            .await
    }

    /// Poll a container until it can be published.
    ///
    /// Bounded by `max_poll_attempts` checks and an overall time budget, and
    /// abandoned as soon as `cancel` fires.
    async fn wait_until_ready(
        &self,
        token: &str,
        container_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PlatformError> {
        let attempts = self.settings.max_poll_attempts;
        let timed_out = || PlatformError::ContainerTimeout {
            container_id: container_id.to_string(),
            attempts,
        };

        let poll = async {
            for attempt in 1..=attempts {
                match self.client.container_status(token, container_id).await? {
                    ContainerStatus::Finished | ContainerStatus::Published => return Ok(()),
                    ContainerStatus::Error(reason) => {
                        return Err(PlatformError::ContainerFailed {
                            container_id: container_id.to_string(),
                            reason,
                        });
                    }
                    ContainerStatus::Expired => {
                        return Err(PlatformError::ContainerFailed {
                            container_id: container_id.to_string(),
                            reason: "container expired before it could be published".to_string(),
                        });
                    }
                    ContainerStatus::InProgress => {
                        tracing::debug!(container_id, attempt, "container still processing");
                    }
                }

                if attempt < attempts {
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
            Err(timed_out())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PlatformError::Cancelled),
            result = tokio::time::timeout(self.settings.wait_budget(), poll) => {
                result.unwrap_or_else(|_| Err(timed_out()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::domain::social::MediaItem;
    use crate::services::testing::{FakePlatform, connect_account, draft_post};
    use crate::store::{InMemoryStore, PostStore};

    fn fast() -> PublishSettings {
        PublishSettings {
            poll_interval: Duration::from_millis(5),
            max_poll_attempts: 3,
        }
    }

    fn publisher(store: &Arc<InMemoryStore>, platform: &Arc<FakePlatform>) -> Publisher {
        let tokens = Arc::new(TokenManager::new(store.clone(), platform.clone()));
        Publisher::new(store.clone(), platform.clone(), tokens, fast())
    }

    fn image() -> Vec<MediaItem> {
        vec![MediaItem::image("https://cdn.example.com/a.jpg")]
    }

    fn delivery(name: &str, error: Option<&str>) -> AccountDelivery {
        AccountDelivery {
            post_account_id: 1,
            account_id: 1,
            provider: Some(Provider::Facebook),
            account_name: name.to_string(),
            platform_status: if error.is_some() {
                PlatformStatus::Failed
            } else {
                PlatformStatus::Published
            },
            platform_post_id: error.is_none().then(|| "x".to_string()),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_aggregate_policy() {
        assert_eq!(
            aggregate(&[]),
            (PostStatus::Failed, Some("no linked accounts".to_string()))
        );
        assert_eq!(
            aggregate(&[delivery("A", None), delivery("B", None)]),
            (PostStatus::Published, None)
        );

        let (status, message) = aggregate(&[delivery("A", None), delivery("B", Some("boom"))]);
        assert_eq!(status, PostStatus::Published);
        assert_eq!(
            message.as_deref(),
            Some("Published to 1 of 2 accounts; failed: B (facebook): boom")
        );

        let (status, message) =
            aggregate(&[delivery("A", Some("first")), delivery("B", Some("second"))]);
        assert_eq!(status, PostStatus::Failed);
        let message = message.unwrap();
        assert!(message.contains("first") && message.contains("second"));
    }

    #[tokio::test]
    async fn test_partial_failure_isolated_to_one_account() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().fail_target("page-b", "(#200) Permissions error"));
        let publisher = publisher(&store, &platform);

        let a = connect_account(&store, Provider::Facebook, "A", Some(30)).await;
        let b = connect_account(&store, Provider::Facebook, "B", Some(30)).await;
        let c = connect_account(&store, Provider::Facebook, "C", Some(30)).await;
        let post = draft_post(&store, PostType::Post, image());
        let links: Vec<_> = [&a, &b, &c]
            .iter()
            .map(|acct| store.link_account(post.id, acct.id))
            .collect();

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Published);
        assert!(report.error_message.unwrap().contains("(#200) Permissions error"));

        let rows: Vec<_> = links
            .iter()
            .map(|l| store.post_account(l.id).unwrap())
            .collect();
        assert_eq!(rows[0].platform_status, PlatformStatus::Published);
        assert_eq!(rows[1].platform_status, PlatformStatus::Failed);
        assert_eq!(rows[1].platform_error.as_deref(), Some("(#200) Permissions error"));
        assert_eq!(rows[2].platform_status, PlatformStatus::Published);
        assert!(rows[2].platform_post_id.is_some());

        let stored = store.get_social_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.published_at.is_some());
    }

    #[tokio::test]
    async fn test_all_accounts_failing_fails_post_with_every_error() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(
            FakePlatform::new()
                .fail_target("page-a", "Invalid image URL")
                .fail_target("instagram-b", "Media type not supported"),
        );
        let publisher = publisher(&store, &platform);

        let a = connect_account(&store, Provider::Facebook, "A", Some(30)).await;
        let b = connect_account(&store, Provider::Instagram, "B", Some(30)).await;
        let post = draft_post(&store, PostType::Post, image());
        store.link_account(post.id, a.id);
        store.link_account(post.id, b.id);

        let actor = Actor::new(3, Role::Staff);
        let report = publisher.publish(post.id, Some(&actor)).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        let message = report.error_message.unwrap();
        assert!(message.contains("Invalid image URL"));
        assert!(message.contains("Media type not supported"));

        let events = store.audit_events();
        let last = events.last().unwrap();
        assert_eq!(last.action, audit::POST_FAILED);
        assert_eq!(last.actor, "user:3");
    }

    #[tokio::test]
    async fn test_publishing_post_is_rejected_without_mutation() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);

        let a = connect_account(&store, Provider::Facebook, "A", Some(30)).await;
        let post = draft_post(&store, PostType::Post, image());
        let link = store.link_account(post.id, a.id);
        assert!(store.begin_publishing(post.id).await.unwrap());

        let err = publisher.publish(post.id, None).await.unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::PublishConflict {
                status: PostStatus::Publishing,
                ..
            }
        ));
        assert_eq!(store.post_account(link.id).unwrap(), link);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_published_post_cannot_be_republished() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);
        let a = connect_account(&store, Provider::Facebook, "A", Some(30)).await;
        let post = draft_post(&store, PostType::Post, image());
        store.link_account(post.id, a.id);

        publisher.publish(post.id, None).await.unwrap();
        let err = publisher.publish(post.id, None).await.unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::PublishConflict {
                status: PostStatus::Published,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_post_without_accounts_fails() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);
        let post = draft_post(&store, PostType::Post, image());

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert_eq!(report.error_message.as_deref(), Some("no linked accounts"));
    }

    #[tokio::test]
    async fn test_reel_waits_for_container_then_publishes() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().with_container_statuses(vec![
            ContainerStatus::InProgress,
            ContainerStatus::Finished,
        ]));
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Reel,
            vec![MediaItem::video("https://cdn.example.com/v.mp4")],
        );
        store.link_account(post.id, ig.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Published);
        assert_eq!(platform.calls_matching("status:"), 2);
        assert_eq!(platform.calls_matching("publish:"), 1);
    }

    #[tokio::test]
    async fn test_container_error_fails_account() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().with_container_statuses(vec![
            ContainerStatus::Error("Video too long".to_string()),
        ]));
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Reel,
            vec![MediaItem::video("https://cdn.example.com/v.mp4")],
        );
        let link = store.link_account(post.id, ig.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        let row = store.post_account(link.id).unwrap();
        assert!(row.platform_error.unwrap().contains("Video too long"));
        assert_eq!(platform.calls_matching("publish:"), 0);
    }

    #[tokio::test]
    async fn test_container_poll_budget_is_bounded() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(
            FakePlatform::new().with_container_statuses(vec![ContainerStatus::InProgress; 10]),
        );
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Reel,
            vec![MediaItem::video("https://cdn.example.com/v.mp4")],
        );
        store.link_account(post.id, ig.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert_eq!(platform.calls_matching("status:"), 3);
        assert!(report.accounts[0].error.as_ref().unwrap().contains("not ready after 3"));
    }

    #[tokio::test]
    async fn test_cancelled_wait_still_settles_post() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(
            FakePlatform::new().with_container_statuses(vec![ContainerStatus::InProgress; 10]),
        );
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Reel,
            vec![MediaItem::video("https://cdn.example.com/v.mp4")],
        );
        store.link_account(post.id, ig.id);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = publisher
            .publish_with_cancel(post.id, None, cancel)
            .await
            .unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert_eq!(report.accounts[0].error.as_deref(), Some("publishing cancelled"));
        let stored = store.get_social_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_carousel_creates_children_then_parent() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Carousel,
            vec![
                MediaItem::image("https://cdn.example.com/1.jpg"),
                MediaItem::image("https://cdn.example.com/2.jpg"),
                MediaItem::video("https://cdn.example.com/3.mp4"),
            ],
        );
        store.link_account(post.id, ig.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Published);
        assert_eq!(platform.calls_matching("container:instagram-acme:item"), 3);
        assert_eq!(platform.calls_matching("container:instagram-acme:carousel"), 1);
        // video child, then the parent
        assert_eq!(platform.calls_matching("status:instagram-acme_3"), 1);
        assert_eq!(platform.calls_matching("status:instagram-acme_4"), 1);
    }

    #[tokio::test]
    async fn test_failed_video_child_stops_carousel() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().with_container_statuses(vec![
            ContainerStatus::InProgress,
            ContainerStatus::Error("unsupported codec".to_string()),
        ]));
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Carousel,
            vec![
                MediaItem::video("https://cdn.example.com/1.mp4"),
                MediaItem::image("https://cdn.example.com/2.jpg"),
            ],
        );
        store.link_account(post.id, ig.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        let error = report.accounts[0].error.as_deref().unwrap();
        assert!(error.contains("unsupported codec"), "{error}");
        assert_eq!(platform.calls_matching("status:instagram-acme_1"), 2);
        assert_eq!(platform.calls_matching("container:instagram-acme:item"), 1);
        assert_eq!(platform.calls_matching("container:instagram-acme:carousel"), 0);
        assert_eq!(platform.calls_matching("publish:"), 0);
    }

    #[test]
    fn test_wait_budget_saturates() {
        let settings = PublishSettings {
            poll_interval: Duration::from_secs(u64::MAX / 2),
            max_poll_attempts: 1_000,
        };
        assert_eq!(settings.wait_budget(), Duration::MAX);
        assert_eq!(fast().wait_budget(), Duration::from_secs(30) + Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_instagram_without_media_fails_account() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);
        let ig = connect_account(&store, Provider::Instagram, "acme", Some(30)).await;
        let fb = connect_account(&store, Provider::Facebook, "Acme", Some(30)).await;
        let post = draft_post(&store, PostType::Post, Vec::new());
        store.link_account(post.id, ig.id);
        store.link_account(post.id, fb.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Published);
        assert!(report.accounts[0].error.is_some());
        assert!(report.accounts[1].error.is_none());
        assert_eq!(platform.calls_matching("page_post:page-acme:0"), 1);
    }

    #[tokio::test]
    async fn test_expired_token_fails_account_with_reconnect_message() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);
        let a = connect_account(&store, Provider::Facebook, "Old Page", Some(-1)).await;
        let post = draft_post(&store, PostType::Post, image());
        store.link_account(post.id, a.id);

        let report = publisher.publish(post.id, None).await.unwrap();

        assert_eq!(report.status, PostStatus::Failed);
        assert!(report.accounts[0]
            .error
            .as_ref()
            .unwrap()
            .contains("reconnect the account"));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_post_can_be_retried() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let publisher = publisher(&store, &platform);
        let a = connect_account(&store, Provider::Facebook, "A", Some(30)).await;
        let post = draft_post(&store, PostType::Post, image());

        let first = publisher.publish(post.id, None).await.unwrap();
        assert_eq!(first.status, PostStatus::Failed);

        store.link_account(post.id, a.id);
        let second = publisher.publish(post.id, None).await.unwrap();
        assert_eq!(second.status, PostStatus::Published);
    }
}
