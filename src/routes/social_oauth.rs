//! Meta OAuth endpoints (/auth/meta/*)

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::AppState;
use crate::domain::social::SocialAccount;
use crate::routes::auth::AuthActor;
use crate::services::error::LifecycleError;

pub fn routes() -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/auth/meta", get(auth_meta))
        .route("/auth/meta/callback", post(auth_meta_callback));

    // Stricter for OAuth: burst of 5, then one request every 12 seconds per IP
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(12)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish();

    match rate_limit_config {
        Some(config) => router.layer(GovernorLayer {
            config: config.into(),
        }),
        None => {
            tracing::warn!("invalid OAuth rate limit config; serving without rate limiting");
            router
        }
    }
}

#[derive(Serialize)]
struct AuthUrlResponse {
    url: String,
}

/// GET /auth/meta - Start the OAuth flow, returns the dialog URL to redirect to
async fn auth_meta(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
) -> Result<Json<AuthUrlResponse>, LifecycleError> {
    let url = state.tokens.authorize_url(actor.user_id).await?;
    Ok(Json(AuthUrlResponse { url }))
}

#[derive(Deserialize)]
struct CallbackRequest {
    code: String,
    state: String,
}

/// POST /auth/meta/callback - Exchange the code and connect the granted accounts
async fn auth_meta_callback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<Vec<SocialAccount>>, LifecycleError> {
    let accounts = state
        .tokens
        .exchange_oauth_code(&req.code, &req.state)
        .await?;

    tracing::info!(connected = accounts.len(), "meta accounts connected");
    Ok(Json(accounts))
}
