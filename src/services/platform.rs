//! Platform client seams
//!
//! The orchestrator and token manager talk to social platforms only through
//! these traits. `MetaClient` is the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::social::{MediaItem, Provider};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Error reported by the remote API. Displays the remote message verbatim.
    #[error("{message}")]
    Remote { status: Option<u16>, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("media container {container_id} failed: {reason}")]
    ContainerFailed { container_id: String, reason: String },
    #[error("media container {container_id} not ready after {attempts} status checks")]
    ContainerTimeout { container_id: String, attempts: u32 },
    #[error("publishing cancelled")]
    Cancelled,
    #[error("access token for {0} has expired; reconnect the account")]
    TokenExpired(String),
    #[error("{0}")]
    Unsupported(String),
}

/// An error body a platform may return alongside a non-2xx status
pub trait RemoteErrorPayload: DeserializeOwned {
    fn remote_message(&self) -> Option<String>;
}

/// Build a `PlatformError` from a failed response body.
///
/// Falls back to the raw body when it does not parse as `P` or carries no message.
pub fn remote_error<P: RemoteErrorPayload>(status: Option<u16>, body: &str) -> PlatformError {
    let message = serde_json::from_str::<P>(body)
        .ok()
        .and_then(|payload| payload.remote_message())
        .unwrap_or_else(|| match status {
            Some(code) => format!("Status {}: {}", code, body),
            None => body.to_string(),
        });

    PlatformError::Remote { status, message }
}

/// An access token returned by an OAuth exchange
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub access_token: String,
    /// Lifetime in seconds, when the provider reports one
    pub expires_in: Option<i64>,
}

impl AccessGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

#[derive(Debug, Clone)]
pub struct BusinessIdentity {
    pub id: String,
    pub username: String,
}

/// A page the user manages, with its page-scoped token
#[derive(Debug, Clone)]
pub struct PageIdentity {
    pub id: String,
    pub name: String,
    pub access_token: String,
    pub business: Option<BusinessIdentity>,
}

/// Media container to create on a business account
#[derive(Debug, Clone, Copy)]
pub enum ContainerRequest<'a> {
    Single {
        media: &'a MediaItem,
        caption: &'a str,
    },
    CarouselItem {
        media: &'a MediaItem,
    },
    Carousel {
        children: &'a [String],
        caption: &'a str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    Published,
    Error(String),
    Expired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementMetrics {
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
}

impl std::ops::Add for EngagementMetrics {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            likes: self.likes + other.likes,
            comments: self.comments + other.comments,
            shares: self.shares + other.shares,
        }
    }
}

/// OAuth dialog and token exchange
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<AccessGrant, PlatformError>;

    /// Trade a token (short- or long-lived) for a fresh long-lived one
    async fn exchange_long_lived(&self, access_token: &str) -> Result<AccessGrant, PlatformError>;

    async fn list_pages(&self, user_token: &str) -> Result<Vec<PageIdentity>, PlatformError>;
}

/// Content publishing on pages and business accounts
#[async_trait]
pub trait PublishingClient: Send + Sync {
    /// Create a page post in one call. Returns the platform post id.
    async fn publish_page_post(
        &self,
        access_token: &str,
        page_id: &str,
        caption: &str,
        media: &[MediaItem],
    ) -> Result<String, PlatformError>;

    /// Returns the container id
    async fn create_container(
        &self,
        access_token: &str,
        business_id: &str,
        request: ContainerRequest<'_>,
    ) -> Result<String, PlatformError>;

    async fn container_status(
        &self,
        access_token: &str,
        container_id: &str,
    ) -> Result<ContainerStatus, PlatformError>;

    /// Returns the published media id
    async fn publish_container(
        &self,
        access_token: &str,
        business_id: &str,
        container_id: &str,
    ) -> Result<String, PlatformError>;

    async fn fetch_metrics(
        &self,
        access_token: &str,
        provider: Provider,
        platform_post_id: &str,
    ) -> Result<EngagementMetrics, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Envelope {
        error: Option<Inner>,
    }

    #[derive(Deserialize)]
    struct Inner {
        message: String,
    }

    impl RemoteErrorPayload for Envelope {
        fn remote_message(&self) -> Option<String> {
            self.error.as_ref().map(|e| e.message.clone())
        }
    }

    #[test]
    fn test_remote_error_uses_payload_message_verbatim() {
        let err = remote_error::<Envelope>(Some(400), r#"{"error":{"message":"Invalid image"}}"#);
        assert_eq!(err.to_string(), "Invalid image");
    }

    #[test]
    fn test_remote_error_falls_back_to_body() {
        let err = remote_error::<Envelope>(Some(502), "Bad Gateway");
        assert_eq!(err.to_string(), "Status 502: Bad Gateway");
    }
}
