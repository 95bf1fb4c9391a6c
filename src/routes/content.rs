//! Content lifecycle endpoints (/content/*, /platform-posts/*)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::AppState;
use crate::domain::{ContentItem, ContentOutput, ContentStatus, NewContentOutput, OutputType};
use crate::routes::auth::AuthActor;
use crate::services::error::LifecycleError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/content/{id}/transition", post(transition))
        .route("/content/{id}/transitions", get(list_transitions))
        .route("/content/{id}/outputs", post(add_output))
        .route("/platform-posts/{id}/approve", post(approve_platform_post))
}

#[derive(Deserialize)]
struct TransitionRequest {
    to_status: ContentStatus,
}

/// POST /content/{id}/transition - Move an item to another status
async fn transition(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(item_id): Path<i64>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<ContentItem>, LifecycleError> {
    let item = state
        .transitions
        .request_transition(item_id, req.to_status, &actor)
        .await?;
    Ok(Json(item))
}

#[derive(Serialize)]
struct TransitionsResponse {
    current_status: ContentStatus,
    valid_targets: BTreeSet<ContentStatus>,
}

/// GET /content/{id}/transitions - Statuses the caller may move the item to
async fn list_transitions(
    State(state): State<Arc<AppState>>,
    AuthActor(actor): AuthActor,
    Path(item_id): Path<i64>,
) -> Result<Json<TransitionsResponse>, LifecycleError> {
    let (current_status, valid_targets) =
        state.transitions.valid_targets(item_id, actor.role).await?;
    Ok(Json(TransitionsResponse {
        current_status,
        valid_targets,
    }))
}

#[derive(Deserialize)]
struct AddOutputRequest {
    output_type: OutputType,
    #[serde(default)]
    payload: serde_json::Value,
}

/// POST /content/{id}/outputs - Attach a generated output, then re-evaluate promotion
async fn add_output(
    State(state): State<Arc<AppState>>,
    AuthActor(_actor): AuthActor,
    Path(item_id): Path<i64>,
    Json(req): Json<AddOutputRequest>,
) -> Result<(StatusCode, Json<ContentOutput>), LifecycleError> {
    let output = state
        .promotion
        .add_output(NewContentOutput {
            content_item_id: item_id,
            output_type: req.output_type,
            payload: req.payload,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(output)))
}

#[derive(Serialize)]
struct ApproveResponse {
    platform_post_id: i64,
    product_id: i64,
}

/// POST /platform-posts/{id}/approve - Approve a platform post for its product
async fn approve_platform_post(
    State(state): State<Arc<AppState>>,
    AuthActor(_actor): AuthActor,
    Path(platform_post_id): Path<i64>,
) -> Result<Json<ApproveResponse>, LifecycleError> {
    let product_id = state.promotion.approve_platform_post(platform_post_id).await?;
    Ok(Json(ApproveResponse {
        platform_post_id,
        product_id,
    }))
}
