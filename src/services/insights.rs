//! Engagement metrics for published posts

use serde::Serialize;
use std::sync::Arc;

use super::error::LifecycleError;
use super::platform::{EngagementMetrics, PublishingClient};
use super::tokens::TokenManager;
use crate::domain::social::{PlatformStatus, Provider};
use crate::store::DataStore;

#[derive(Debug, Clone, Serialize)]
pub struct AccountMetrics {
    pub account_id: i64,
    pub provider: Option<Provider>,
    pub platform_post_id: Option<String>,
    pub metrics: Option<EngagementMetrics>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostMetrics {
    pub post_id: i64,
    pub accounts: Vec<AccountMetrics>,
    /// Sum over every account that returned metrics
    pub total: EngagementMetrics,
}

pub struct Insights {
    store: Arc<dyn DataStore>,
    client: Arc<dyn PublishingClient>,
    tokens: Arc<TokenManager>,
}

impl Insights {
    pub fn new(
        store: Arc<dyn DataStore>,
        client: Arc<dyn PublishingClient>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            store,
            client,
            tokens,
        }
    }

    /// Fetch likes, comments and shares for every account a post reached.
    ///
    /// A metrics failure on one account is reported on that account only.
    pub async fn post_metrics(&self, post_id: i64) -> Result<PostMetrics, LifecycleError> {
        self.store
            .get_social_post(post_id)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "social post",
                id: post_id,
            })?;

        let links = self.store.list_post_accounts(post_id).await?;
        let mut accounts = Vec::with_capacity(links.len());

        for link in links {
            let mut entry = AccountMetrics {
                account_id: link.account_id,
                provider: None,
                platform_post_id: link.platform_post_id.clone(),
                metrics: None,
                error: None,
            };

            let platform_post_id = match (&link.platform_status, &link.platform_post_id) {
                (PlatformStatus::Published, Some(id)) => id,
                _ => {
                    accounts.push(entry);
                    continue;
                }
            };

            let account = match self.store.get_social_account(link.account_id).await? {
                Some(account) => account,
                None => {
                    entry.error = Some("account no longer connected".to_string());
                    accounts.push(entry);
                    continue;
                }
            };
            entry.provider = Some(account.provider);

            let token = match self.tokens.ensure_usable(&account).await {
                Ok(token) => token,
                Err(e) => {
                    entry.error = Some(e.to_string());
                    accounts.push(entry);
                    continue;
                }
            };

            match self
                .client
                .fetch_metrics(&token, account.provider, platform_post_id)
                .await
            {
                Ok(metrics) => entry.metrics = Some(metrics),
                Err(e) => {
                    tracing::warn!(post_id, account_id = account.id, error = %e, "metrics fetch failed");
                    entry.error = Some(e.to_string());
                }
            }
            accounts.push(entry);
        }

        let total = accounts
            .iter()
            .filter_map(|a| a.metrics)
            .fold(EngagementMetrics::default(), |acc, m| acc + m);

        Ok(PostMetrics {
            post_id,
            accounts,
            total,
        })
    }
}
