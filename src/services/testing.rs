//! Scripted platform client and fixtures shared by service tests

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use super::platform::{
    AccessGrant, BusinessIdentity, ContainerRequest, ContainerStatus, EngagementMetrics,
    OAuthProvider, PageIdentity, PlatformError, PublishingClient,
};
use crate::domain::social::{
    MediaItem, NewSocialAccount, NewSocialPost, PostStatus, PostType, Provider, SocialAccount,
    SocialPost,
};
use crate::store::{AccountStore, InMemoryStore};

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    next_id: u64,
    /// Remote error message keyed by page or business account id
    failures: HashMap<String, String>,
    token_failure: Option<String>,
    statuses: VecDeque<ContainerStatus>,
    metrics: HashMap<String, EngagementMetrics>,
}

#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
    pages: Vec<PageIdentity>,
    exchange_delay_ms: u64,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page_id: &str, name: &str, business_id: Option<&str>) -> Self {
        self.pages.push(PageIdentity {
            id: page_id.to_string(),
            name: name.to_string(),
            access_token: format!("page-token-{}", page_id),
            business: business_id.map(|id| BusinessIdentity {
                id: id.to_string(),
                username: name.to_lowercase(),
            }),
        });
        self
    }

    pub fn with_exchange_delay(mut self, millis: u64) -> Self {
        self.exchange_delay_ms = millis;
        self
    }

    /// Every call targeting `target_id` fails with `message`
    pub fn fail_target(self, target_id: &str, message: &str) -> Self {
        self.state
            .lock()
            .failures
            .insert(target_id.to_string(), message.to_string());
        self
    }

    pub fn fail_token_exchange(self, message: &str) -> Self {
        self.state.lock().token_failure = Some(message.to_string());
        self
    }

    /// Statuses returned by successive container polls; `Finished` once drained
    pub fn with_container_statuses(self, statuses: Vec<ContainerStatus>) -> Self {
        self.state.lock().statuses = statuses.into();
        self
    }

    pub fn with_metrics(self, platform_post_id: &str, metrics: EngagementMetrics) -> Self {
        self.state
            .lock()
            .metrics
            .insert(platform_post_id.to_string(), metrics);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String, target: &str) -> Result<String, PlatformError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if let Some(message) = state.failures.get(target) {
            return Err(PlatformError::Remote {
                status: Some(400),
                message: message.clone(),
            });
        }
        state.next_id += 1;
        Ok(format!("{}_{}", target, state.next_id))
    }
}

#[async_trait]
impl OAuthProvider for FakePlatform {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://fake.example/dialog/oauth?client_id=app&state={}", state)
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessGrant, PlatformError> {
        self.state.lock().calls.push(format!("exchange_code:{}", code));
        Ok(AccessGrant {
            access_token: format!("short-{}", code),
            expires_in: Some(3600),
        })
    }

    async fn exchange_long_lived(&self, access_token: &str) -> Result<AccessGrant, PlatformError> {
        let failure = {
            let mut state = self.state.lock();
            state.calls.push(format!("exchange_long_lived:{}", access_token));
            state.token_failure.clone()
        };

        if self.exchange_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.exchange_delay_ms)).await;
        }

        if let Some(message) = failure {
            return Err(PlatformError::Remote {
                status: Some(400),
                message,
            });
        }

        Ok(AccessGrant {
            access_token: format!("long-{}", access_token),
            expires_in: Some(60 * 24 * 3600),
        })
    }

    async fn list_pages(&self, _user_token: &str) -> Result<Vec<PageIdentity>, PlatformError> {
        self.state.lock().calls.push("list_pages".to_string());
        Ok(self.pages.clone())
    }
}

#[async_trait]
impl PublishingClient for FakePlatform {
    async fn publish_page_post(
        &self,
        _access_token: &str,
        page_id: &str,
        _caption: &str,
        media: &[MediaItem],
    ) -> Result<String, PlatformError> {
        self.record(format!("page_post:{}:{}", page_id, media.len()), page_id)
    }

    async fn create_container(
        &self,
        _access_token: &str,
        business_id: &str,
        request: ContainerRequest<'_>,
    ) -> Result<String, PlatformError> {
        let kind = match request {
            ContainerRequest::Single { .. } => "single",
            ContainerRequest::CarouselItem { .. } => "item",
            ContainerRequest::Carousel { .. } => "carousel",
        };
        self.record(format!("container:{}:{}", business_id, kind), business_id)
    }

    async fn container_status(
        &self,
        _access_token: &str,
        container_id: &str,
    ) -> Result<ContainerStatus, PlatformError> {
        let mut state = self.state.lock();
        state.calls.push(format!("status:{}", container_id));
        Ok(state.statuses.pop_front().unwrap_or(ContainerStatus::Finished))
    }

    async fn publish_container(
        &self,
        _access_token: &str,
        business_id: &str,
        container_id: &str,
    ) -> Result<String, PlatformError> {
        self.record(format!("publish:{}:{}", business_id, container_id), business_id)
    }

    async fn fetch_metrics(
        &self,
        _access_token: &str,
        _provider: Provider,
        platform_post_id: &str,
    ) -> Result<EngagementMetrics, PlatformError> {
        let mut state = self.state.lock();
        state.calls.push(format!("metrics:{}", platform_post_id));
        state
            .metrics
            .get(platform_post_id)
            .copied()
            .ok_or_else(|| PlatformError::Remote {
                status: Some(404),
                message: format!("Unknown object {}", platform_post_id),
            })
    }
}

/// Connect an account whose token expires `expires_in_days` from now
pub async fn connect_account(
    store: &InMemoryStore,
    provider: Provider,
    name: &str,
    expires_in_days: Option<i64>,
) -> SocialAccount {
    let slug = name.to_lowercase().replace(' ', "-");
    store
        .upsert_social_account(NewSocialAccount {
            user_id: 1,
            provider,
            provider_account_id: format!("{}-{}", provider, slug),
            account_name: name.to_string(),
            page_id: Some(format!("page-{}", slug)),
            access_token: format!("token-{}", slug),
            token_expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
            is_long_lived: true,
        })
        .await
        .expect("seed social account")
}

pub fn draft_post(store: &InMemoryStore, post_type: PostType, media: Vec<MediaItem>) -> SocialPost {
    store.insert_social_post(NewSocialPost {
        user_id: 1,
        caption: "Spring launch".to_string(),
        post_type,
        media,
        status: PostStatus::Draft,
        scheduled_at: None,
    })
}
