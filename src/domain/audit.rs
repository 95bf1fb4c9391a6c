//! Audit events emitted after committed state changes

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;
use super::actor::Role;

pub const STATUS_CHANGED: &str = "status_changed";
pub const STATUS_AUTO_PROMOTED: &str = "status_auto_promoted";
pub const ACCOUNT_CONNECTED: &str = "social_account_connected";
pub const TOKEN_REFRESHED: &str = "token_refreshed";
pub const POST_PUBLISHED: &str = "post_published";
pub const POST_FAILED: &str = "post_failed";

/// Actor label for events raised by the auto-promotion engine
pub const AUTO_PROMOTION_ACTOR: &str = "system:auto-promotion";
/// Actor label for events raised by the background scheduler
pub const SCHEDULER_ACTOR: &str = "system:scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    ContentItem,
    SocialPost,
    SocialAccount,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::ContentItem => "content_item",
            EntityType::SocialPost => "social_post",
            EntityType::SocialAccount => "social_account",
        }
    }
}

impl FromStr for EntityType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_item" => Ok(EntityType::ContentItem),
            "social_post" => Ok(EntityType::SocialPost),
            "social_account" => Ok(EntityType::SocialAccount),
            other => Err(ParseEnumError::new("entity type", other)),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

super::text_column!(EntityType);

/// One append-only audit log entry.
///
/// `actor_role` is `None` for events raised by the system rather than a user.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub action: String,
    pub actor: String,
    pub actor_role: Option<Role>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity_type: EntityType,
        entity_id: i64,
        action: &str,
        actor: impl Into<String>,
        actor_role: Option<Role>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            action: action.to_string(),
            actor: actor.into(),
            actor_role,
            details,
            created_at: Utc::now(),
        }
    }
}
