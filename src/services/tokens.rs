//! Social account connection and access token lifecycle

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::LifecycleError;
use super::platform::{OAuthProvider, PlatformError};
use crate::constants::{LONG_LIVED_TOKEN_DAYS, TOKEN_EXPIRY_WARNING_DAYS};
use crate::domain::audit::{self, AuditEvent, EntityType};
use crate::domain::social::{NewSocialAccount, Provider, SocialAccount, TokenStatus};
use crate::store::{DataStore, record_audit};

/// Outcome of one sweep over expiring tokens
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSweep {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped_expired: usize,
}

pub struct TokenManager {
    store: Arc<dyn DataStore>,
    oauth: Arc<dyn OAuthProvider>,
    refresh_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn DataStore>, oauth: Arc<dyn OAuthProvider>) -> Self {
        Self {
            store,
            oauth,
            refresh_locks: DashMap::new(),
        }
    }

    /// Generate random state for CSRF protection
    fn generate_state() -> String {
        let bytes: [u8; 16] = rand::rng().random();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Persist a fresh OAuth state for `user_id` and return the dialog URL
    pub async fn authorize_url(&self, user_id: i64) -> Result<String, LifecycleError> {
        let state = Self::generate_state();
        self.store.save_oauth_state(&state, user_id).await?;
        Ok(self.oauth.authorize_url(&state))
    }

    /// Complete the OAuth dialog: consume `state`, obtain a long-lived token and
    /// connect every page (and linked business account) the user granted.
    pub async fn exchange_oauth_code(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Vec<SocialAccount>, LifecycleError> {
        if code.trim().is_empty() {
            return Err(LifecycleError::Validation("missing authorization code".to_string()));
        }

        let user_id = self
            .store
            .take_oauth_state(state)
            .await?
            .ok_or_else(|| LifecycleError::Validation("invalid or expired OAuth state".to_string()))?;

        let short_lived = self.oauth.exchange_code(code).await?;
        let long_lived = self.oauth.exchange_long_lived(&short_lived.access_token).await?;
        let expires_at = long_lived.expires_at(Utc::now());

        let pages = self.oauth.list_pages(&long_lived.access_token).await?;
        if pages.is_empty() {
            tracing::warn!(user_id, "OAuth grant did not include any pages");
        }

        let mut connected = Vec::new();
        for page in pages {
            let mut identities = vec![NewSocialAccount {
                user_id,
                provider: Provider::Facebook,
                provider_account_id: page.id.clone(),
                account_name: page.name.clone(),
                page_id: Some(page.id.clone()),
                access_token: page.access_token.clone(),
                token_expires_at: expires_at,
                is_long_lived: true,
            }];

            if let Some(business) = page.business {
                identities.push(NewSocialAccount {
                    user_id,
                    provider: Provider::Instagram,
                    provider_account_id: business.id,
                    account_name: business.username,
                    page_id: Some(page.id.clone()),
                    access_token: page.access_token.clone(),
                    token_expires_at: expires_at,
                    is_long_lived: true,
                });
            }

            for identity in identities {
                let account = self.store.upsert_social_account(identity).await?;
                record_audit(
                    self.store.as_ref(),
                    AuditEvent::new(
                        EntityType::SocialAccount,
                        account.id,
                        audit::ACCOUNT_CONNECTED,
                        format!("user:{}", user_id),
                        None,
                        json!({
                            "provider": account.provider,
                            "provider_account_id": account.provider_account_id,
                            "page_id": account.page_id,
                        }),
                    ),
                )
                .await;
                tracing::info!(
                    user_id,
                    account_id = account.id,
                    provider = %account.provider,
                    "social account connected"
                );
                connected.push(account);
            }
        }

        Ok(connected)
    }

    /// Re-exchange an account's long-lived token and return the new expiry.
    ///
    /// Refreshes of one account are serialized. A caller that waited behind an
    /// in-flight refresh returns that refresh's result without calling out again.
    pub async fn refresh_token(&self, account_id: i64) -> Result<DateTime<Utc>, LifecycleError> {
        let account = self.refresh(account_id).await?;
        account.token_expires_at.ok_or_else(|| {
            LifecycleError::Validation(format!("account {} has no token expiry", account_id))
        })
    }

    async fn refresh(&self, account_id: i64) -> Result<SocialAccount, LifecycleError> {
        let requested_at = Utc::now();
        let lock = self.refresh_locks.entry(account_id).or_default().clone();
        let _guard = lock.lock().await;

        let account = self
            .store
            .get_social_account(account_id)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "social account",
                id: account_id,
            })?;

        if account
            .token_refreshed_at
            .is_some_and(|refreshed_at| refreshed_at >= requested_at)
        {
            tracing::debug!(account_id, "token refreshed while waiting; reusing result");
            return Ok(account);
        }

        let grant = self.oauth.exchange_long_lived(&account.access_token).await?;
        let now = Utc::now();
        let expires_at = grant
            .expires_at(now)
            .unwrap_or_else(|| now + Duration::days(LONG_LIVED_TOKEN_DAYS));

        let updated = self
            .store
            .update_account_token(account_id, &grant.access_token, expires_at, now)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "social account",
                id: account_id,
            })?;

        record_audit(
            self.store.as_ref(),
            AuditEvent::new(
                EntityType::SocialAccount,
                account_id,
                audit::TOKEN_REFRESHED,
                format!("user:{}", account.user_id),
                None,
                json!({
                    "previous_expiry": account.token_expires_at,
                    "token_expires_at": updated.token_expires_at,
                }),
            ),
        )
        .await;

        tracing::info!(account_id, expires_at = %expires_at, "access token refreshed");
        Ok(updated)
    }

    /// Return a token that can be used for `account` right now.
    ///
    /// Expired tokens fail. Tokens close to expiry are refreshed first, falling
    /// back to the current token if the refresh fails.
    pub async fn ensure_usable(&self, account: &SocialAccount) -> Result<String, PlatformError> {
        match account.token_status(Utc::now()) {
            TokenStatus::Expired => Err(PlatformError::TokenExpired(account.account_name.clone())),
            TokenStatus::ExpiringSoon => match self.refresh(account.id).await {
                Ok(refreshed) => Ok(refreshed.access_token),
                Err(e) => {
                    tracing::warn!(
                        account_id = account.id,
                        error = %e,
                        "speculative token refresh failed; using current token"
                    );
                    Ok(account.access_token.clone())
                }
            },
            TokenStatus::Active | TokenStatus::Unknown => Ok(account.access_token.clone()),
        }
    }

    /// Refresh every token that expires within the warning window
    pub async fn refresh_expiring(&self, now: DateTime<Utc>) -> Result<RefreshSweep, LifecycleError> {
        let cutoff = now + Duration::days(TOKEN_EXPIRY_WARNING_DAYS);
        let accounts = self.store.accounts_expiring_before(cutoff).await?;

        let mut sweep = RefreshSweep::default();
        for account in accounts {
            if account.token_status(now) == TokenStatus::Expired {
                tracing::warn!(account_id = account.id, "token already expired; reconnect required");
                sweep.skipped_expired += 1;
                continue;
            }

            match self.refresh(account.id).await {
                Ok(_) => sweep.refreshed += 1,
                Err(e) => {
                    tracing::warn!(account_id = account.id, error = %e, "scheduled token refresh failed");
                    sweep.failed += 1;
                }
            }
        }

        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{FakePlatform, connect_account};
    use crate::store::{AccountStore, InMemoryStore};

    fn manager(store: &Arc<InMemoryStore>, platform: &Arc<FakePlatform>) -> TokenManager {
        TokenManager::new(store.clone(), platform.clone())
    }

    #[tokio::test]
    async fn test_oauth_callback_connects_page_and_business_account() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().with_page("page-1", "Acme", Some("ig-1")));
        let tokens = manager(&store, &platform);

        let url = tokens.authorize_url(42).await.unwrap();
        let state = url.rsplit("state=").next().unwrap().to_string();

        let accounts = tokens.exchange_oauth_code("code-1", &state).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].provider, Provider::Facebook);
        assert_eq!(accounts[1].provider, Provider::Instagram);
        assert_eq!(accounts[0].page_id.as_deref(), Some("page-1"));
        assert_eq!(accounts[1].page_id.as_deref(), Some("page-1"));
        assert!(accounts.iter().all(|a| a.is_long_lived && a.user_id == 42));

        // Same grant again: rows are updated in place
        store.save_oauth_state("again", 42).await.unwrap();
        tokens.exchange_oauth_code("code-2", "again").await.unwrap();
        assert_eq!(store.list_social_accounts(42).await.unwrap().len(), 2);

        let connected = store
            .audit_events()
            .iter()
            .filter(|e| e.action == audit::ACCOUNT_CONNECTED)
            .count();
        assert_eq!(connected, 4);
    }

    #[tokio::test]
    async fn test_oauth_state_cannot_be_replayed() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().with_page("page-1", "Acme", None));
        let tokens = manager(&store, &platform);

        store.save_oauth_state("s1", 7).await.unwrap();
        tokens.exchange_oauth_code("code", "s1").await.unwrap();

        let err = tokens.exchange_oauth_code("code", "s1").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let tokens = manager(&store, &platform);
        let account = connect_account(&store, Provider::Facebook, "Acme", Some(2)).await;

        let expiry = tokens.refresh_token(account.id).await.unwrap();

        assert!(expiry > Utc::now() + Duration::days(50));
        let stored = store.get_social_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.token_status(Utc::now()), TokenStatus::Active);
        assert!(stored.token_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_call_provider_once() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().with_exchange_delay(50));
        let tokens = manager(&store, &platform);
        let account = connect_account(&store, Provider::Facebook, "Acme", Some(2)).await;

        let (a, b) = tokio::join!(tokens.refresh_token(account.id), tokens.refresh_token(account.id));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(platform.calls_matching("exchange_long_lived"), 1);
    }

    #[tokio::test]
    async fn test_refresh_surfaces_provider_message() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().fail_token_exchange("Session has expired"));
        let tokens = manager(&store, &platform);
        let account = connect_account(&store, Provider::Facebook, "Acme", Some(2)).await;

        let err = tokens.refresh_token(account.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Session has expired");
    }

    #[tokio::test]
    async fn test_ensure_usable_by_token_status() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new().fail_token_exchange("rate limited"));
        let tokens = manager(&store, &platform);

        let expired = connect_account(&store, Provider::Facebook, "Old Page", Some(-1)).await;
        let err = tokens.ensure_usable(&expired).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "access token for Old Page has expired; reconnect the account"
        );

        // Failed speculative refresh falls back to the stored token
        let expiring = connect_account(&store, Provider::Instagram, "acme", Some(2)).await;
        assert_eq!(
            tokens.ensure_usable(&expiring).await.unwrap(),
            expiring.access_token
        );
    }

    #[tokio::test]
    async fn test_refresh_expiring_skips_expired_and_healthy_tokens() {
        let store = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let tokens = manager(&store, &platform);
        connect_account(&store, Provider::Facebook, "Soon", Some(3)).await;
        connect_account(&store, Provider::Facebook, "Gone", Some(-2)).await;
        connect_account(&store, Provider::Facebook, "Fine", Some(40)).await;

        let sweep = tokens.refresh_expiring(Utc::now()).await.unwrap();

        assert_eq!(
            sweep,
            RefreshSweep {
                refreshed: 1,
                failed: 0,
                skipped_expired: 1
            }
        );
    }
}
