//! Social post model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;

use crate::domain::ParseEnumError;

/// Post-level publishing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// Statuses a publish attempt may start from. A failed post can be retried.
    pub fn can_start_publish(&self) -> bool {
        matches!(
            self,
            PostStatus::Draft | PostStatus::Scheduled | PostStatus::Failed
        )
    }
}

impl FromStr for PostStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "publishing" => Ok(PostStatus::Publishing),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(ParseEnumError::new("post status", other)),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

crate::domain::text_column!(PostStatus);

/// Requested post shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    Post,
    Carousel,
    Reel,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Post => "post",
            PostType::Carousel => "carousel",
            PostType::Reel => "reel",
        }
    }
}

impl FromStr for PostType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(PostType::Post),
            "carousel" => Ok(PostType::Carousel),
            "reel" => Ok(PostType::Reel),
            other => Err(ParseEnumError::new("post type", other)),
        }
    }
}

crate::domain::text_column!(PostType);

/// Delivery status of one post on one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    Idle,
    Publishing,
    Published,
    Failed,
}

impl PlatformStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformStatus::Idle => "idle",
            PlatformStatus::Publishing => "publishing",
            PlatformStatus::Published => "published",
            PlatformStatus::Failed => "failed",
        }
    }
}

impl FromStr for PlatformStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(PlatformStatus::Idle),
            "publishing" => Ok(PlatformStatus::Publishing),
            "published" => Ok(PlatformStatus::Published),
            "failed" => Ok(PlatformStatus::Failed),
            other => Err(ParseEnumError::new("platform status", other)),
        }
    }
}

crate::domain::text_column!(PlatformStatus);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// One publicly reachable asset attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
}

#[cfg(test)]
impl MediaItem {
    pub fn image(url: &str) -> Self {
        Self {
            url: url.to_string(),
            kind: MediaKind::Image,
        }
    }

    pub fn video(url: &str) -> Self {
        Self {
            url: url.to_string(),
            kind: MediaKind::Video,
        }
    }
}

/// Schedulable content targeting one or more social accounts
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SocialPost {
    pub id: i64,
    pub user_id: i64,
    pub caption: String,
    pub post_type: PostType,
    /// Ordered media list
    pub media: Json<Vec<MediaItem>>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for seeding a social post
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct NewSocialPost {
    pub user_id: i64,
    pub caption: String,
    pub post_type: PostType,
    pub media: Vec<MediaItem>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Join row tracking one account's delivery attempt for one post
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SocialPostAccount {
    pub id: i64,
    pub post_id: i64,
    pub account_id: i64,
    pub platform_status: PlatformStatus,
    pub platform_post_id: Option<String>,
    pub platform_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Result of one account's delivery attempt, as written back to its join row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Published { platform_post_id: String },
    Failed { error: String },
}

impl DeliveryOutcome {
    pub fn platform_status(&self) -> PlatformStatus {
        match self {
            DeliveryOutcome::Published { .. } => PlatformStatus::Published,
            DeliveryOutcome::Failed { .. } => PlatformStatus::Failed,
        }
    }
}
