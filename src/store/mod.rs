//! Persistence seams for the lifecycle engine
//!
//! Every conditional write (status compare-and-set, publish guard, token expiry)
//! is expressed as a single store call so that both backends can make it
//! atomic. Services only ever hold an `Arc<dyn DataStore>`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::social::{
    DeliveryOutcome, NewSocialAccount, PostStatus, SocialAccount, SocialPost, SocialPostAccount,
};
use crate::domain::{AuditEvent, ContentItem, ContentOutput, ContentStatus, NewContentOutput};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content_item(&self, id: i64) -> StoreResult<Option<ContentItem>>;

    /// Set `status = next` only if the item is currently `expected`.
    /// Returns whether the row was updated.
    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: ContentStatus,
        next: ContentStatus,
    ) -> StoreResult<bool>;

    async fn list_outputs(&self, content_item_id: i64) -> StoreResult<Vec<ContentOutput>>;

    async fn insert_output(&self, output: NewContentOutput) -> StoreResult<ContentOutput>;
}

/// Products and the approved platform posts that gate promotion
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Case-insensitive exact match on product name
    async fn find_product_id_by_name(&self, name: &str) -> StoreResult<Option<i64>>;

    async fn count_approved_platform_posts(&self, product_id: i64) -> StoreResult<i64>;

    /// Mark a platform post approved, returning its product id
    async fn approve_platform_post(&self, platform_post_id: i64) -> StoreResult<Option<i64>>;

    /// Content items linked to a product by id or by name
    async fn content_items_for_product(&self, product_id: i64) -> StoreResult<Vec<i64>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert or update by `(user_id, provider, provider_account_id)`
    async fn upsert_social_account(&self, account: NewSocialAccount)
    -> StoreResult<SocialAccount>;

    async fn get_social_account(&self, id: i64) -> StoreResult<Option<SocialAccount>>;

    async fn list_social_accounts(&self, user_id: i64) -> StoreResult<Vec<SocialAccount>>;

    async fn accounts_expiring_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<SocialAccount>>;

    /// Store a refreshed token. The stored expiry never moves backwards.
    async fn update_account_token(
        &self,
        id: i64,
        access_token: &str,
        expires_at: DateTime<Utc>,
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<Option<SocialAccount>>;

    async fn save_oauth_state(&self, state: &str, user_id: i64) -> StoreResult<()>;

    /// Consume an OAuth state, returning its user if it exists and is fresh
    async fn take_oauth_state(&self, state: &str) -> StoreResult<Option<i64>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn get_social_post(&self, id: i64) -> StoreResult<Option<SocialPost>>;

    async fn list_post_accounts(&self, post_id: i64) -> StoreResult<Vec<SocialPostAccount>>;

    /// Move a post to `publishing` if it is draft, scheduled or failed.
    /// Returns whether this caller won the guard.
    async fn begin_publishing(&self, post_id: i64) -> StoreResult<bool>;

    async fn mark_post_accounts_publishing(&self, post_id: i64) -> StoreResult<u64>;

    async fn record_delivery(
        &self,
        post_account_id: i64,
        outcome: &DeliveryOutcome,
    ) -> StoreResult<()>;

    async fn finish_publishing(
        &self,
        post_id: i64,
        status: PostStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()>;

    /// Scheduled posts whose `scheduled_at` has passed
    async fn due_scheduled_posts(&self, now: DateTime<Utc>) -> StoreResult<Vec<i64>>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> StoreResult<()>;
}

/// Everything the services need from a backend
pub trait DataStore: ContentStore + CatalogStore + AccountStore + PostStore + AuditSink {}

impl<T> DataStore for T where T: ContentStore + CatalogStore + AccountStore + PostStore + AuditSink {}

/// Append an audit event after a committed change.
///
/// Audit failures are logged and never undo or fail the change they describe.
pub async fn record_audit<S: AuditSink + ?Sized>(sink: &S, event: AuditEvent) {
    let action = event.action.clone();
    let entity_id = event.entity_id;
    if let Err(e) = sink.append(event).await {
        tracing::warn!(error = %e, %action, entity_id, "failed to append audit event");
    }
}
