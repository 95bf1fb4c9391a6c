//! Postgres backend

pub mod audit;
pub mod content;
pub mod social;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{
    AccountStore, AuditSink, CatalogStore, ContentStore, PostStore, StoreError, StoreResult,
};
use crate::domain::social::{
    DeliveryOutcome, NewSocialAccount, PostStatus, SocialAccount, SocialPost, SocialPostAccount,
};
use crate::domain::{AuditEvent, ContentItem, ContentOutput, ContentStatus, NewContentOutput};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ContentStore for PgStore {
    async fn get_content_item(&self, id: i64) -> StoreResult<Option<ContentItem>> {
        Ok(content::get_content_item(&self.pool, id).await?)
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: ContentStatus,
        next: ContentStatus,
    ) -> StoreResult<bool> {
        Ok(content::compare_and_set_status(&self.pool, id, expected, next).await?)
    }

    async fn list_outputs(&self, content_item_id: i64) -> StoreResult<Vec<ContentOutput>> {
        Ok(content::list_outputs(&self.pool, content_item_id).await?)
    }

    async fn insert_output(&self, output: NewContentOutput) -> StoreResult<ContentOutput> {
        content::insert_output(&self.pool, &output)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => StoreError::NotFound {
                    entity: "content item",
                    id: output.content_item_id,
                },
                other => StoreError::Database(other),
            })
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_product_id_by_name(&self, name: &str) -> StoreResult<Option<i64>> {
        Ok(content::find_product_id_by_name(&self.pool, name).await?)
    }

    async fn count_approved_platform_posts(&self, product_id: i64) -> StoreResult<i64> {
        Ok(content::count_approved_platform_posts(&self.pool, product_id).await?)
    }

    async fn approve_platform_post(&self, platform_post_id: i64) -> StoreResult<Option<i64>> {
        Ok(content::approve_platform_post(&self.pool, platform_post_id).await?)
    }

    async fn content_items_for_product(&self, product_id: i64) -> StoreResult<Vec<i64>> {
        Ok(content::content_items_for_product(&self.pool, product_id).await?)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn upsert_social_account(
        &self,
        account: NewSocialAccount,
    ) -> StoreResult<SocialAccount> {
        Ok(social::upsert_social_account(&self.pool, &account).await?)
    }

    async fn get_social_account(&self, id: i64) -> StoreResult<Option<SocialAccount>> {
        Ok(social::get_social_account(&self.pool, id).await?)
    }

    async fn list_social_accounts(&self, user_id: i64) -> StoreResult<Vec<SocialAccount>> {
        Ok(social::list_social_accounts(&self.pool, user_id).await?)
    }

    async fn accounts_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<SocialAccount>> {
        Ok(social::accounts_expiring_before(&self.pool, cutoff).await?)
    }

    async fn update_account_token(
        &self,
        id: i64,
        access_token: &str,
        expires_at: DateTime<Utc>,
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<Option<SocialAccount>> {
        Ok(
            social::update_account_token(&self.pool, id, access_token, expires_at, refreshed_at)
                .await?,
        )
    }

    async fn save_oauth_state(&self, state: &str, user_id: i64) -> StoreResult<()> {
        // Opportunistic cleanup; a failure here must not block the login flow
        if let Err(e) = social::purge_oauth_states(&self.pool).await {
            tracing::warn!(error = %e, "failed to purge stale oauth states");
        }
        Ok(social::save_oauth_state(&self.pool, state, user_id).await?)
    }

    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<i64>> {
        Ok(social::take_oauth_state(&self.pool, state).await?)
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn get_social_post(&self, id: i64) -> StoreResult<Option<SocialPost>> {
        Ok(social::get_social_post(&self.pool, id).await?)
    }

    async fn list_post_accounts(&self, post_id: i64) -> StoreResult<Vec<SocialPostAccount>> {
        Ok(social::list_post_accounts(&self.pool, post_id).await?)
    }

    async fn begin_publishing(&self, post_id: i64) -> StoreResult<bool> {
        Ok(social::begin_publishing(&self.pool, post_id).await?)
    }

    async fn mark_post_accounts_publishing(&self, post_id: i64) -> StoreResult<u64> {
        Ok(social::mark_post_accounts_publishing(&self.pool, post_id).await?)
    }

    async fn record_delivery(
        &self,
        post_account_id: i64,
        outcome: &DeliveryOutcome,
    ) -> StoreResult<()> {
        let updated = social::record_delivery(&self.pool, post_account_id, outcome).await?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "social post account",
                id: post_account_id,
            });
        }
        Ok(())
    }

    async fn finish_publishing(
        &self,
        post_id: i64,
        status: PostStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        let updated = social::finish_publishing(&self.pool, post_id, status, error_message).await?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "social post",
                id: post_id,
            });
        }
        Ok(())
    }

    async fn due_scheduled_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        Ok(social::due_scheduled_posts(&self.pool, now).await?)
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn append(&self, event: AuditEvent) -> StoreResult<()> {
        Ok(audit::append_event(&self.pool, &event).await?)
    }
}
