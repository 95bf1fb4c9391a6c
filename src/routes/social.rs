//! Social account and post endpoints (/social/*)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::domain::Actor;
use crate::domain::social::{SocialAccount, SocialPost, TokenStatus};
use crate::routes::auth::AuthActor;
use crate::services::error::{LifecycleError, LogErr};
use crate::services::insights::PostMetrics;
use crate::services::publisher::PublishReport;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/social/accounts", get(list_accounts))
        .route("/social/accounts/{id}/refresh", post(refresh_account))
        .route("/social/posts/{id}/publish", post(publish_post))
        .route("/social/posts/{id}/metrics", get(post_metrics))
}

#[derive(Serialize)]
struct AccountResponse {
    #[serde(flatten)]
    account: SocialAccount,
    token_status: TokenStatus,
}

/// GET /social/accounts - Connected accounts with their token health
async fn list_accounts(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
) -> Result<Json<Vec<AccountResponse>>, StatusCode> {
    let accounts = state
        .store
        .list_social_accounts(actor.user_id)
        .await
        .log_500("List social accounts error")?;

    let now = Utc::now();
    Ok(Json(
        accounts
            .into_iter()
            .map(|account| AccountResponse {
                token_status: account.token_status(now),
                account,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct RefreshResponse {
    account_id: i64,
    token_expires_at: DateTime<Utc>,
}

/// POST /social/accounts/{id}/refresh - Exchange the account's token for a fresh one
async fn refresh_account(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(account_id): Path<i64>,
) -> Result<Json<RefreshResponse>, LifecycleError> {
    let not_found = LifecycleError::NotFound {
        entity: "social account",
        id: account_id,
    };
    let account = state
        .store
        .get_social_account(account_id)
        .await?
        .filter(|a| a.user_id == actor.user_id)
        .ok_or(not_found)?;

    let token_expires_at = state.tokens.refresh_token(account.id).await?;
    Ok(Json(RefreshResponse {
        account_id,
        token_expires_at,
    }))
}

/// POST /social/posts/{id}/publish - Publish a post to every linked account
///
/// Runs on its own task so the post always settles. A dropped request cancels
/// any pending container wait.
async fn publish_post(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(post_id): Path<i64>,
) -> Result<Json<PublishReport>, Response> {
    let post = owned_post(&state, &actor, post_id)
        .await
        .map_err(IntoResponse::into_response)?;

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let publisher = state.publisher.clone();
    let report = tokio::spawn(async move {
        publisher
            .publish_with_cancel(post.id, Some(&actor), cancel)
            .await
    })
    .await
    .log_500("Publish task failed")
    .map_err(IntoResponse::into_response)?
    .map_err(IntoResponse::into_response)?;

    Ok(Json(report))
}

/// GET /social/posts/{id}/metrics - Engagement per account and in total
async fn post_metrics(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(post_id): Path<i64>,
) -> Result<Json<PostMetrics>, LifecycleError> {
    let post = owned_post(&state, &actor, post_id).await?;
    Ok(Json(state.insights.post_metrics(post.id).await?))
}

/// Load a post owned by `actor`; other users' posts read as missing
async fn owned_post(
    state: &AppState,
    actor: &Actor,
    post_id: i64,
) -> Result<SocialPost, LifecycleError> {
    state
        .store
        .get_social_post(post_id)
        .await?
        .filter(|p| p.user_id == actor.user_id)
        .ok_or(LifecycleError::NotFound {
            entity: "social post",
            id: post_id,
        })
}
