//! In-memory backend
//!
//! One mutex guards all tables, so every trait method is atomic with respect
//! to every other. Used by tests and by `STORAGE_BACKEND=memory`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{
    AccountStore, AuditSink, CatalogStore, ContentStore, PostStore, StoreError, StoreResult,
};
use crate::constants::OAUTH_STATE_TTL_MINUTES;
use crate::domain::social::{
    DeliveryOutcome, NewSocialAccount, PlatformStatus, PostStatus, SocialAccount, SocialPost,
    SocialPostAccount,
};
use crate::domain::{AuditEvent, ContentItem, ContentOutput, ContentStatus, NewContentOutput};
#[cfg(test)]
use crate::domain::{NewContentItem, social::NewSocialPost};

#[derive(Debug, Clone)]
struct PlatformPostRow {
    product_id: i64,
    approved: bool,
}

#[derive(Default)]
struct State {
    next_id: i64,
    products: HashMap<i64, String>,
    platform_posts: HashMap<i64, PlatformPostRow>,
    content_items: BTreeMap<i64, ContentItem>,
    outputs: Vec<ContentOutput>,
    accounts: BTreeMap<i64, SocialAccount>,
    oauth_states: HashMap<String, (i64, DateTime<Utc>)>,
    posts: BTreeMap<i64, SocialPost>,
    post_accounts: BTreeMap<i64, SocialPostAccount>,
    audit: Vec<AuditEvent>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an OAuth state with an explicit creation time
    pub fn insert_oauth_state_at(&self, oauth_state: &str, user_id: i64, created_at: DateTime<Utc>) {
        self.state
            .lock()
            .oauth_states
            .insert(oauth_state.to_string(), (user_id, created_at));
    }
}

/// Seeders and inspection hooks for tests
#[cfg(test)]
impl InMemoryStore {
    pub fn insert_product(&self, name: &str) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.products.insert(id, name.to_string());
        id
    }

    pub fn insert_platform_post(&self, product_id: i64, approved: bool) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.platform_posts.insert(
            id,
            PlatformPostRow {
                product_id,
                approved,
            },
        );
        id
    }

    pub fn insert_content_item(&self, item: NewContentItem) -> ContentItem {
        let mut state = self.state.lock();
        let now = Utc::now();
        let row = ContentItem {
            id: state.next_id(),
            owner_id: item.owner_id,
            title: item.title,
            status: item.status,
            product_id: item.product_id,
            product_name: item.product_name,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        state.content_items.insert(row.id, row.clone());
        row
    }

    pub fn insert_social_post(&self, post: NewSocialPost) -> SocialPost {
        let mut state = self.state.lock();
        let now = Utc::now();
        let row = SocialPost {
            id: state.next_id(),
            user_id: post.user_id,
            caption: post.caption,
            post_type: post.post_type,
            media: sqlx::types::Json(post.media),
            status: post.status,
            scheduled_at: post.scheduled_at,
            published_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(row.id, row.clone());
        row
    }

    /// Target `account_id` with `post_id`
    pub fn link_account(&self, post_id: i64, account_id: i64) -> SocialPostAccount {
        let mut state = self.state.lock();
        let row = SocialPostAccount {
            id: state.next_id(),
            post_id,
            account_id,
            platform_status: PlatformStatus::Idle,
            platform_post_id: None,
            platform_error: None,
            published_at: None,
            updated_at: Utc::now(),
        };
        state.post_accounts.insert(row.id, row.clone());
        row
    }

    pub fn post_account(&self, id: i64) -> Option<SocialPostAccount> {
        self.state.lock().post_accounts.get(&id).cloned()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.lock().audit.clone()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn get_content_item(&self, id: i64) -> StoreResult<Option<ContentItem>> {
        Ok(self.state.lock().content_items.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: ContentStatus,
        next: ContentStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state.content_items.get_mut(&id) {
            Some(item) if item.status == expected => {
                item.status = next;
                item.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_outputs(&self, content_item_id: i64) -> StoreResult<Vec<ContentOutput>> {
        Ok(self
            .state
            .lock()
            .outputs
            .iter()
            .filter(|o| o.content_item_id == content_item_id)
            .cloned()
            .collect())
    }

    async fn insert_output(&self, output: NewContentOutput) -> StoreResult<ContentOutput> {
        let mut state = self.state.lock();
        if !state.content_items.contains_key(&output.content_item_id) {
            return Err(StoreError::NotFound {
                entity: "content item",
                id: output.content_item_id,
            });
        }
        let row = ContentOutput {
            id: state.next_id(),
            content_item_id: output.content_item_id,
            output_type: output.output_type,
            payload: output.payload,
            created_at: Utc::now(),
        };
        state.outputs.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn find_product_id_by_name(&self, name: &str) -> StoreResult<Option<i64>> {
        let state = self.state.lock();
        let wanted = name.to_lowercase();
        let mut matches: Vec<i64> = state
            .products
            .iter()
            .filter(|(_, product)| product.to_lowercase() == wanted)
            .map(|(id, _)| *id)
            .collect();
        matches.sort_unstable();
        Ok(matches.first().copied())
    }

    async fn count_approved_platform_posts(&self, product_id: i64) -> StoreResult<i64> {
        let state = self.state.lock();
        let count = state
            .platform_posts
            .values()
            .filter(|p| p.product_id == product_id && p.approved)
            .count();
        Ok(count as i64)
    }

    async fn approve_platform_post(&self, platform_post_id: i64) -> StoreResult<Option<i64>> {
        let mut state = self.state.lock();
        Ok(state.platform_posts.get_mut(&platform_post_id).map(|p| {
            p.approved = true;
            p.product_id
        }))
    }

    async fn content_items_for_product(&self, product_id: i64) -> StoreResult<Vec<i64>> {
        let state = self.state.lock();
        let name = state.products.get(&product_id).map(|n| n.to_lowercase());
        Ok(state
            .content_items
            .values()
            .filter(|item| match (item.product_id, &item.product_name, &name) {
                (Some(id), _, _) => id == product_id,
                (None, Some(item_name), Some(name)) => item_name.to_lowercase() == *name,
                _ => false,
            })
            .map(|item| item.id)
            .collect())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn upsert_social_account(
        &self,
        account: NewSocialAccount,
    ) -> StoreResult<SocialAccount> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let existing = state.accounts.values_mut().find(|a| {
            a.user_id == account.user_id
                && a.provider == account.provider
                && a.provider_account_id == account.provider_account_id
        });

        if let Some(row) = existing {
            row.account_name = account.account_name;
            row.access_token = account.access_token;
            row.token_expires_at = account.token_expires_at.or(row.token_expires_at);
            row.is_long_lived = account.is_long_lived;
            row.page_id = account.page_id.or(row.page_id.take());
            row.updated_at = now;
            return Ok(row.clone());
        }

        let row = SocialAccount {
            id: state.next_id(),
            user_id: account.user_id,
            provider: account.provider,
            provider_account_id: account.provider_account_id,
            account_name: account.account_name,
            page_id: account.page_id,
            access_token: account.access_token,
            token_expires_at: account.token_expires_at,
            is_long_lived: account.is_long_lived,
            token_refreshed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_social_account(&self, id: i64) -> StoreResult<Option<SocialAccount>> {
        Ok(self.state.lock().accounts.get(&id).cloned())
    }

    async fn list_social_accounts(&self, user_id: i64) -> StoreResult<Vec<SocialAccount>> {
        Ok(self
            .state
            .lock()
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn accounts_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<SocialAccount>> {
        Ok(self
            .state
            .lock()
            .accounts
            .values()
            .filter(|a| a.token_expires_at.is_some_and(|t| t < cutoff))
            .cloned()
            .collect())
    }

    async fn update_account_token(
        &self,
        id: i64,
        access_token: &str,
        expires_at: DateTime<Utc>,
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<Option<SocialAccount>> {
        let mut state = self.state.lock();
        Ok(state.accounts.get_mut(&id).map(|row| {
            row.access_token = access_token.to_string();
            row.token_expires_at = Some(match row.token_expires_at {
                Some(current) => current.max(expires_at),
                None => expires_at,
            });
            row.is_long_lived = true;
            row.token_refreshed_at = Some(refreshed_at);
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn save_oauth_state(&self, oauth_state: &str, user_id: i64) -> StoreResult<()> {
        self.insert_oauth_state_at(oauth_state, user_id, Utc::now());
        Ok(())
    }

    async fn take_oauth_state(&self, oauth_state: &str) -> StoreResult<Option<i64>> {
        let cutoff = Utc::now() - Duration::minutes(OAUTH_STATE_TTL_MINUTES);
        let taken = self.state.lock().oauth_states.remove(oauth_state);
        Ok(taken
            .filter(|(_, created_at)| *created_at > cutoff)
            .map(|(user_id, _)| user_id))
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn get_social_post(&self, id: i64) -> StoreResult<Option<SocialPost>> {
        Ok(self.state.lock().posts.get(&id).cloned())
    }

    async fn list_post_accounts(&self, post_id: i64) -> StoreResult<Vec<SocialPostAccount>> {
        Ok(self
            .state
            .lock()
            .post_accounts
            .values()
            .filter(|pa| pa.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn begin_publishing(&self, post_id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state.posts.get_mut(&post_id) {
            Some(post) if post.status.can_start_publish() => {
                post.status = PostStatus::Publishing;
                post.error_message = None;
                post.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_post_accounts_publishing(&self, post_id: i64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut updated = 0;
        for row in state
            .post_accounts
            .values_mut()
            .filter(|pa| pa.post_id == post_id)
        {
            row.platform_status = PlatformStatus::Publishing;
            row.platform_error = None;
            row.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    async fn record_delivery(
        &self,
        post_account_id: i64,
        outcome: &DeliveryOutcome,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        let row = state
            .post_accounts
            .get_mut(&post_account_id)
            .ok_or(StoreError::NotFound {
                entity: "social post account",
                id: post_account_id,
            })?;

        let now = Utc::now();
        row.platform_status = outcome.platform_status();
        row.updated_at = now;
        match outcome {
            DeliveryOutcome::Published { platform_post_id } => {
                row.platform_post_id = Some(platform_post_id.clone());
                row.platform_error = None;
                row.published_at = Some(now);
            }
            DeliveryOutcome::Failed { error } => {
                row.platform_error = Some(error.clone());
            }
        }
        Ok(())
    }

    async fn finish_publishing(
        &self,
        post_id: i64,
        status: PostStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        let post = state.posts.get_mut(&post_id).ok_or(StoreError::NotFound {
            entity: "social post",
            id: post_id,
        })?;

        let now = Utc::now();
        post.status = status;
        post.error_message = error_message.map(str::to_string);
        post.updated_at = now;
        if status == PostStatus::Published {
            post.published_at = Some(now);
        }
        Ok(())
    }

    async fn due_scheduled_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_at.is_some_and(|t| t <= now))
            .map(|p| p.id)
            .collect())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn append(&self, event: AuditEvent) -> StoreResult<()> {
        self.state.lock().audit.push(event);
        Ok(())
    }
}
