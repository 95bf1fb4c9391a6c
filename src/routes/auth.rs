//! Request authentication

use axum::{
    Json, Router,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    routing::get,
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::AppState;
use crate::domain::Actor;
use crate::services::session;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/me", get(get_me))
}

// ============================================================================
// Auth Extractor - validates the JWT and extracts the acting user and role
// ============================================================================

/// Extractor that validates the access token (cookie first, then bearer header)
pub struct AuthActor(pub Actor);

impl FromRequestParts<Arc<AppState>> for AuthActor {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "cookie extraction error");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let token = match jar.get("access_token") {
            Some(cookie) => cookie.value().to_string(),
            None => parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
                .ok_or(StatusCode::UNAUTHORIZED)?,
        };

        let actor = session::validate_access_token(&token, &state.jwt_secret).map_err(|e| {
            tracing::debug!(error = %e, "access token rejected");
            StatusCode::UNAUTHORIZED
        })?;

        Ok(AuthActor(actor))
    }
}

/// GET /auth/me - The authenticated actor
async fn get_me(AuthActor(actor): AuthActor) -> Json<Actor> {
    Json(actor)
}
