//! Social account, OAuth state and post queries

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

use crate::constants::OAUTH_STATE_TTL_MINUTES;
use crate::domain::social::{
    DeliveryOutcome, NewSocialAccount, PostStatus, SocialAccount, SocialPost, SocialPostAccount,
};

const ACCOUNT_COLUMNS: &str = "id, user_id, provider, provider_account_id, account_name, page_id, \
     access_token, token_expires_at, is_long_lived, token_refreshed_at, created_at, updated_at";

const POST_COLUMNS: &str = "id, user_id, caption, post_type, media, status, scheduled_at, \
     published_at, error_message, created_at, updated_at";

const POST_ACCOUNT_COLUMNS: &str = "id, post_id, account_id, platform_status, platform_post_id, \
     platform_error, published_at, updated_at";

// ============================================================================
// Accounts
// ============================================================================

/// Insert or update by natural key. A missing expiry or page id keeps the stored one.
pub async fn upsert_social_account<'e, E>(
    executor: E,
    account: &NewSocialAccount,
) -> Result<SocialAccount, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "INSERT INTO social_accounts
            (user_id, provider, provider_account_id, account_name, page_id,
             access_token, token_expires_at, is_long_lived)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (user_id, provider, provider_account_id) DO UPDATE SET
            account_name = EXCLUDED.account_name,
            page_id = COALESCE(EXCLUDED.page_id, social_accounts.page_id),
            access_token = EXCLUDED.access_token,
            token_expires_at = COALESCE(EXCLUDED.token_expires_at, social_accounts.token_expires_at),
            is_long_lived = EXCLUDED.is_long_lived,
            updated_at = NOW()
         RETURNING {ACCOUNT_COLUMNS}"
    );

    sqlx::query_as::<_, SocialAccount>(&query)
        .bind(account.user_id)
        .bind(account.provider)
        .bind(&account.provider_account_id)
        .bind(&account.account_name)
        .bind(&account.page_id)
        .bind(&account.access_token)
        .bind(account.token_expires_at)
        .bind(account.is_long_lived)
        .fetch_one(executor)
        .await
}

pub async fn get_social_account<'e, E>(
    executor: E,
    id: i64,
) -> Result<Option<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE id = $1");
    sqlx::query_as::<_, SocialAccount>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn list_social_accounts<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Vec<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE user_id = $1 ORDER BY id"
    );
    sqlx::query_as::<_, SocialAccount>(&query)
        .bind(user_id)
        .fetch_all(executor)
        .await
}

pub async fn accounts_expiring_before<'e, E>(
    executor: E,
    cutoff: DateTime<Utc>,
) -> Result<Vec<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM social_accounts
         WHERE token_expires_at IS NOT NULL AND token_expires_at < $1
         ORDER BY token_expires_at"
    );
    sqlx::query_as::<_, SocialAccount>(&query)
        .bind(cutoff)
        .fetch_all(executor)
        .await
}

/// Store a refreshed token. `GREATEST` keeps a concurrent later expiry.
pub async fn update_account_token<'e, E>(
    executor: E,
    id: i64,
    access_token: &str,
    expires_at: DateTime<Utc>,
    refreshed_at: DateTime<Utc>,
) -> Result<Option<SocialAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "UPDATE social_accounts
         SET access_token = $2,
             token_expires_at = GREATEST(COALESCE(token_expires_at, $3), $3),
             is_long_lived = TRUE,
             token_refreshed_at = $4,
             updated_at = NOW()
         WHERE id = $1
         RETURNING {ACCOUNT_COLUMNS}"
    );
    sqlx::query_as::<_, SocialAccount>(&query)
        .bind(id)
        .bind(access_token)
        .bind(expires_at)
        .bind(refreshed_at)
        .fetch_optional(executor)
        .await
}

// ============================================================================
// OAuth state
// ============================================================================

pub async fn save_oauth_state<'e, E>(executor: E, state: &str, user_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO oauth_states (state, user_id) VALUES ($1, $2)")
        .bind(state)
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// Atomically consume a fresh state. Stale rows are left for `purge_oauth_states`.
pub async fn take_oauth_state<'e, E>(executor: E, state: &str) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        "DELETE FROM oauth_states
         WHERE state = $1 AND created_at > NOW() - make_interval(mins => $2::int)
         RETURNING user_id",
    )
    .bind(state)
    .bind(OAUTH_STATE_TTL_MINUTES as i32)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(user_id,)| user_id))
}

pub async fn purge_oauth_states<'e, E>(executor: E) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "DELETE FROM oauth_states WHERE created_at <= NOW() - make_interval(mins => $1::int)",
    )
    .bind(OAUTH_STATE_TTL_MINUTES as i32)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Posts
// ============================================================================

pub async fn get_social_post<'e, E>(executor: E, id: i64) -> Result<Option<SocialPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {POST_COLUMNS} FROM social_posts WHERE id = $1");
    sqlx::query_as::<_, SocialPost>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn list_post_accounts<'e, E>(
    executor: E,
    post_id: i64,
) -> Result<Vec<SocialPostAccount>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        "SELECT {POST_ACCOUNT_COLUMNS} FROM social_post_accounts WHERE post_id = $1 ORDER BY id"
    );
    sqlx::query_as::<_, SocialPostAccount>(&query)
        .bind(post_id)
        .fetch_all(executor)
        .await
}

/// Publish guard. Only one caller can move a post into `publishing`.
pub async fn begin_publishing<'e, E>(executor: E, post_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE social_posts
         SET status = 'publishing', error_message = NULL, updated_at = NOW()
         WHERE id = $1 AND status IN ('draft', 'scheduled', 'failed')",
    )
    .bind(post_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn mark_post_accounts_publishing<'e, E>(
    executor: E,
    post_id: i64,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE social_post_accounts
         SET platform_status = 'publishing', platform_error = NULL, updated_at = NOW()
         WHERE post_id = $1",
    )
    .bind(post_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn record_delivery<'e, E>(
    executor: E,
    post_account_id: i64,
    outcome: &DeliveryOutcome,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = match outcome {
        DeliveryOutcome::Published { platform_post_id } => {
            sqlx::query(
                "UPDATE social_post_accounts
                 SET platform_status = 'published', platform_post_id = $2,
                     platform_error = NULL, published_at = NOW(), updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(post_account_id)
            .bind(platform_post_id)
            .execute(executor)
            .await?
        }
        DeliveryOutcome::Failed { error } => {
            sqlx::query(
                "UPDATE social_post_accounts
                 SET platform_status = 'failed', platform_error = $2, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(post_account_id)
            .bind(error)
            .execute(executor)
            .await?
        }
    };

    Ok(result.rows_affected())
}

pub async fn finish_publishing<'e, E>(
    executor: E,
    post_id: i64,
    status: PostStatus,
    error_message: Option<&str>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE social_posts
         SET status = $2,
             error_message = $3,
             published_at = CASE WHEN $2 = 'published' THEN NOW() ELSE published_at END,
             updated_at = NOW()
         WHERE id = $1",
    )
    .bind(post_id)
    .bind(status)
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn due_scheduled_posts<'e, E>(
    executor: E,
    now: DateTime<Utc>,
) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM social_posts
         WHERE status = 'scheduled' AND scheduled_at <= $1
         ORDER BY scheduled_at",
    )
    .bind(now)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
