//! Connected social account model definitions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::TOKEN_EXPIRY_WARNING_DAYS;
use crate::domain::ParseEnumError;

/// External platform an account lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Facebook,
    Instagram,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Facebook => "facebook",
            Provider::Instagram => "instagram",
        }
    }
}

impl FromStr for Provider {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(Provider::Facebook),
            "instagram" => Ok(Provider::Instagram),
            other => Err(ParseEnumError::new("provider", other)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

crate::domain::text_column!(Provider);

/// Health of an account's stored access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    ExpiringSoon,
    Expired,
    Unknown,
}

impl TokenStatus {
    /// Classify a token expiry relative to `now`
    pub fn classify(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(expires_at) = expires_at else {
            return TokenStatus::Unknown;
        };

        let remaining = expires_at - now;
        if remaining < Duration::zero() {
            TokenStatus::Expired
        } else if remaining < Duration::days(TOKEN_EXPIRY_WARNING_DAYS) {
            TokenStatus::ExpiringSoon
        } else {
            TokenStatus::Active
        }
    }
}

/// One external identity (a page or a business account) on one provider.
///
/// `(user_id, provider, provider_account_id)` is the natural key used for upserts.
/// A page and the business account linked to it share `page_id`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SocialAccount {
    pub id: i64,
    pub user_id: i64,
    pub provider: Provider,
    pub provider_account_id: String,
    pub account_name: String,
    pub page_id: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_long_lived: bool,
    pub token_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SocialAccount {
    pub fn token_status(&self, now: DateTime<Utc>) -> TokenStatus {
        TokenStatus::classify(self.token_expires_at, now)
    }
}

/// Fields written when connecting (or re-connecting) an account
#[derive(Debug, Clone)]
pub struct NewSocialAccount {
    pub user_id: i64,
    pub provider: Provider,
    pub provider_account_id: String,
    pub account_name: String,
    pub page_id: Option<String>,
    pub access_token: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub is_long_lived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_classification() {
        let now = Utc::now();
        assert_eq!(
            TokenStatus::classify(Some(now + Duration::days(2)), now),
            TokenStatus::ExpiringSoon
        );
        assert_eq!(
            TokenStatus::classify(Some(now - Duration::days(1)), now),
            TokenStatus::Expired
        );
        assert_eq!(
            TokenStatus::classify(Some(now + Duration::days(30)), now),
            TokenStatus::Active
        );
        assert_eq!(TokenStatus::classify(None, now), TokenStatus::Unknown);
    }

    #[test]
    fn test_token_expiry_boundaries() {
        let now = Utc::now();
        assert_eq!(TokenStatus::classify(Some(now), now), TokenStatus::ExpiringSoon);
        assert_eq!(
            TokenStatus::classify(Some(now + Duration::days(7)), now),
            TokenStatus::Active
        );
    }
}
