//! Error handling utilities for services and route handlers

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::collections::BTreeSet;

use super::platform::PlatformError;
use crate::domain::ContentStatus;
use crate::domain::social::PostStatus;
use crate::store::StoreError;

/// Extension trait for logging errors and converting to StatusCode
pub trait LogErr<T> {
    /// Log error with context and return INTERNAL_SERVER_ERROR
    fn log_500(self, context: &str) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// Failures surfaced by the lifecycle services
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("cannot move from {from} to {to}")]
    TransitionRejected {
        from: ContentStatus,
        to: ContentStatus,
        valid_targets: BTreeSet<ContentStatus>,
    },

    #[error("social post {post_id} is already {status}")]
    PublishConflict { post_id: i64, status: PostStatus },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => LifecycleError::NotFound { entity, id },
            other => LifecycleError::Store(other),
        }
    }
}

impl LifecycleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
            LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
            LifecycleError::TransitionRejected { .. } | LifecycleError::PublishConflict { .. } => {
                StatusCode::CONFLICT
            }
            LifecycleError::Platform(_) => StatusCode::BAD_GATEWAY,
            LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            LifecycleError::TransitionRejected {
                from,
                valid_targets,
                ..
            } => json!({
                "error": self.to_string(),
                "current_status": from,
                "valid_targets": valid_targets,
            }),
            LifecycleError::Store(e) => {
                tracing::error!(error = %e, "store error");
                json!({ "error": "internal error" })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
