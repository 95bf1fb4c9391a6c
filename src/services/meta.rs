//! Meta Graph API client for Facebook pages and Instagram business accounts

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;

use super::platform::{
    AccessGrant, BusinessIdentity, ContainerRequest, ContainerStatus, EngagementMetrics,
    OAuthProvider, PageIdentity, PlatformError, PublishingClient, RemoteErrorPayload, remote_error,
};
use crate::constants::META_OAUTH_SCOPES;
use crate::domain::social::{MediaItem, MediaKind, Provider};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on `/me/accounts` pages followed per listing
const MAX_ACCOUNT_PAGES: usize = 10;

#[derive(Clone)]
pub struct MetaClient {
    app_id: String,
    app_secret: String,
    redirect_uri: String,
    graph_base: String,
    dialog_base: String,
    http: Client,
}

impl MetaClient {
    pub fn new(app_id: &str, app_secret: &str, redirect_uri: &str, graph_version: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            graph_base: format!("https://graph.facebook.com/{}", graph_version),
            dialog_base: format!("https://www.facebook.com/{}/dialog/oauth", graph_version),
            http: Client::new(),
        }
    }

    /// Point Graph calls at another host (used against local mock servers)
    #[cfg(test)]
    pub fn with_graph_base(mut self, graph_base: &str) -> Self {
        self.graph_base = graph_base.trim_end_matches('/').to_string();
        self
    }

    /// HMAC-SHA256 of the access token keyed by the app secret
    fn appsecret_proof(&self, access_token: &str) -> Result<String, PlatformError> {
        let mut mac = HmacSha256::new_from_slice(self.app_secret.as_bytes())
            .map_err(|e| PlatformError::Decode(format!("invalid app secret: {}", e)))?;
        mac.update(access_token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn token_params(&self, access_token: &str) -> Result<Vec<(String, String)>, PlatformError> {
        Ok(vec![
            ("access_token".to_string(), access_token.to_string()),
            ("appsecret_proof".to_string(), self.appsecret_proof(access_token)?),
        ])
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let mut query = self.token_params(access_token)?;
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let resp = self
            .http
            .get(format!("{}/{}", self.graph_base, path))
            .query(&query)
            .send()
            .await?;

        Self::parse(resp).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let mut form = self.token_params(access_token)?;
        form.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let resp = self
            .http
            .post(format!("{}/{}", self.graph_base, path))
            .form(&form)
            .send()
            .await?;

        Self::parse(resp).await
    }

    /// Graph responses are JSON; an `error` object wins over the HTTP status
    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, PlatformError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(remote_error::<GraphErrorEnvelope>(Some(status.as_u16()), &text));
        }

        if let Ok(GraphErrorEnvelope { error: Some(err) }) =
            serde_json::from_str::<GraphErrorEnvelope>(&text)
        {
            return Err(PlatformError::Remote {
                status: Some(status.as_u16()),
                message: err.message,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            PlatformError::Decode(format!("Failed to parse response: {} - body: {}", e, text))
        })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<AccessGrant, PlatformError> {
        let resp = self
            .http
            .get(format!("{}/oauth/access_token", self.graph_base))
            .query(params)
            .send()
            .await?;

        let token: TokenResponse = Self::parse(resp).await?;
        Ok(AccessGrant {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }

    /// Stage each image as an unpublished photo, then attach them all to one feed post
    async fn publish_multi_photo(
        &self,
        access_token: &str,
        page_id: &str,
        caption: &str,
        media: &[MediaItem],
    ) -> Result<String, PlatformError> {
        if media.iter().any(|m| m.kind == MediaKind::Video) {
            return Err(PlatformError::Unsupported(
                "Facebook posts with several media items support images only".to_string(),
            ));
        }

        let mut attached = Vec::with_capacity(media.len());
        for item in media {
            let staged: GraphId = self
                .post(
                    &format!("{}/photos", page_id),
                    access_token,
                    &[("url", item.url.as_str()), ("published", "false")],
                )
                .await?;
            attached.push(serde_json::json!({ "media_fbid": staged.id }).to_string());
        }

        let keys: Vec<String> = (0..attached.len())
            .map(|i| format!("attached_media[{}]", i))
            .collect();
        let mut params: Vec<(&str, &str)> = vec![("message", caption)];
        params.extend(keys.iter().map(String::as_str).zip(attached.iter().map(String::as_str)));

        let post: GraphId = self
            .post(&format!("{}/feed", page_id), access_token, &params)
            .await?;
        Ok(post.id)
    }
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: Option<GraphErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    message: String,
}

impl RemoteErrorPayload for GraphErrorEnvelope {
    fn remote_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.message.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GraphId {
    id: String,
    /// Photo uploads report the feed story id separately
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsPage {
    data: Vec<PageEntry>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    id: String,
    name: String,
    access_token: String,
    instagram_business_account: Option<InstagramEntry>,
}

#[derive(Debug, Deserialize)]
struct InstagramEntry {
    id: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatusResponse {
    status_code: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    total_count: i64,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryEdge {
    #[serde(default)]
    summary: Summary,
}

#[derive(Debug, Default, Deserialize)]
struct ShareCount {
    count: i64,
}

#[derive(Debug, Deserialize)]
struct PagePostMetrics {
    #[serde(default)]
    likes: SummaryEdge,
    #[serde(default)]
    comments: SummaryEdge,
    #[serde(default)]
    shares: ShareCount,
}

#[derive(Debug, Deserialize)]
struct InstagramMediaMetrics {
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    comments_count: i64,
}

#[async_trait]
impl OAuthProvider for MetaClient {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&state={}&scope={}&response_type=code",
            self.dialog_base,
            percent_encode(&self.app_id),
            percent_encode(&self.redirect_uri),
            percent_encode(state),
            percent_encode(&META_OAUTH_SCOPES.join(",")),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<AccessGrant, PlatformError> {
        self.token_request(&[
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
    }

    async fn exchange_long_lived(&self, access_token: &str) -> Result<AccessGrant, PlatformError> {
        self.token_request(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("fb_exchange_token", access_token),
        ])
        .await
    }

    async fn list_pages(&self, user_token: &str) -> Result<Vec<PageIdentity>, PlatformError> {
        let mut listing: AccountsPage = self
            .get(
                "me/accounts",
                user_token,
                &[("fields", "id,name,access_token,instagram_business_account{id,username}")],
            )
            .await?;

        let mut entries = Vec::new();
        let mut pages_read = 1;
        loop {
            entries.append(&mut listing.data);
            let next = match listing.paging.and_then(|p| p.next) {
                Some(next) if pages_read < MAX_ACCOUNT_PAGES => next,
                _ => break,
            };
            let resp = self.http.get(next).send().await?;
            listing = Self::parse(resp).await?;
            pages_read += 1;
        }

        Ok(entries
            .into_iter()
            .map(|page| PageIdentity {
                business: page.instagram_business_account.map(|ig| BusinessIdentity {
                    username: ig.username.unwrap_or_else(|| page.name.clone()),
                    id: ig.id,
                }),
                id: page.id,
                name: page.name,
                access_token: page.access_token,
            })
            .collect())
    }
}

#[async_trait]
impl PublishingClient for MetaClient {
    async fn publish_page_post(
        &self,
        access_token: &str,
        page_id: &str,
        caption: &str,
        media: &[MediaItem],
    ) -> Result<String, PlatformError> {
        let created: GraphId = match media {
            [] => {
                self.post(&format!("{}/feed", page_id), access_token, &[("message", caption)])
                    .await?
            }
            [item] if item.kind == MediaKind::Image => {
                self.post(
                    &format!("{}/photos", page_id),
                    access_token,
                    &[("url", item.url.as_str()), ("caption", caption)],
                )
                .await?
            }
            [item] => {
                self.post(
                    &format!("{}/videos", page_id),
                    access_token,
                    &[("file_url", item.url.as_str()), ("description", caption)],
                )
                .await?
            }
            _ => {
                return self
                    .publish_multi_photo(access_token, page_id, caption, media)
                    .await;
            }
        };

        Ok(created.post_id.unwrap_or(created.id))
    }

    async fn create_container(
        &self,
        access_token: &str,
        business_id: &str,
        request: ContainerRequest<'_>,
    ) -> Result<String, PlatformError> {
        let params: Vec<(&str, &str)> = match request {
            ContainerRequest::Single { media, caption } => match media.kind {
                MediaKind::Image => vec![("image_url", media.url.as_str()), ("caption", caption)],
                MediaKind::Video => vec![
                    ("video_url", media.url.as_str()),
                    ("media_type", "REELS"),
                    ("caption", caption),
                ],
            },
            ContainerRequest::CarouselItem { media } => match media.kind {
                MediaKind::Image => vec![("image_url", media.url.as_str()), ("is_carousel_item", "true")],
                MediaKind::Video => vec![
                    ("video_url", media.url.as_str()),
                    ("media_type", "VIDEO"),
                    ("is_carousel_item", "true"),
                ],
            },
            ContainerRequest::Carousel { children, caption } => {
                let joined = children.join(",");
                let container: GraphId = self
                    .post(
                        &format!("{}/media", business_id),
                        access_token,
                        &[
                            ("media_type", "CAROUSEL"),
                            ("children", joined.as_str()),
                            ("caption", caption),
                        ],
                    )
                    .await?;
                return Ok(container.id);
            }
        };

        let container: GraphId = self
            .post(&format!("{}/media", business_id), access_token, &params)
            .await?;
        Ok(container.id)
    }

    async fn container_status(
        &self,
        access_token: &str,
        container_id: &str,
    ) -> Result<ContainerStatus, PlatformError> {
        let resp: ContainerStatusResponse = self
            .get(container_id, access_token, &[("fields", "status_code,status")])
            .await?;

        Ok(match resp.status_code.as_deref() {
            Some("FINISHED") => ContainerStatus::Finished,
            Some("PUBLISHED") => ContainerStatus::Published,
            Some("EXPIRED") => ContainerStatus::Expired,
            Some("ERROR") => ContainerStatus::Error(
                resp.status
                    .unwrap_or_else(|| "media processing failed".to_string()),
            ),
            _ => ContainerStatus::InProgress,
        })
    }

    async fn publish_container(
        &self,
        access_token: &str,
        business_id: &str,
        container_id: &str,
    ) -> Result<String, PlatformError> {
        let published: GraphId = self
            .post(
                &format!("{}/media_publish", business_id),
                access_token,
                &[("creation_id", container_id)],
            )
            .await?;
        Ok(published.id)
    }

    async fn fetch_metrics(
        &self,
        access_token: &str,
        provider: Provider,
        platform_post_id: &str,
    ) -> Result<EngagementMetrics, PlatformError> {
        match provider {
            Provider::Facebook => {
                let metrics: PagePostMetrics = self
                    .get(
                        platform_post_id,
                        access_token,
                        &[("fields", "likes.summary(true),comments.summary(true),shares")],
                    )
                    .await?;
                Ok(EngagementMetrics {
                    likes: metrics.likes.summary.total_count,
                    comments: metrics.comments.summary.total_count,
                    shares: metrics.shares.count,
                })
            }
            Provider::Instagram => {
                let metrics: InstagramMediaMetrics = self
                    .get(
                        platform_post_id,
                        access_token,
                        &[("fields", "like_count,comments_count")],
                    )
                    .await?;
                Ok(EngagementMetrics {
                    likes: metrics.like_count,
                    comments: metrics.comments_count,
                    shares: 0,
                })
            }
        }
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}
