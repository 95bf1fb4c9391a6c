//! Content items and their creative outputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// Lifecycle status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Idea,
    Draft,
    Review,
    Approved,
    Blocked,
    Scheduled,
    Published,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 7] = [
        ContentStatus::Idea,
        ContentStatus::Draft,
        ContentStatus::Review,
        ContentStatus::Approved,
        ContentStatus::Blocked,
        ContentStatus::Scheduled,
        ContentStatus::Published,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Idea => "idea",
            ContentStatus::Draft => "draft",
            ContentStatus::Review => "review",
            ContentStatus::Approved => "approved",
            ContentStatus::Blocked => "blocked",
            ContentStatus::Scheduled => "scheduled",
            ContentStatus::Published => "published",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("content status", s))
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

super::text_column!(ContentStatus);

/// Kind of creative output attached to an item.
///
/// Output types are an open set upstream; the ones the promotion rules care
/// about get their own variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OutputType {
    HeroImage,
    Infographic,
    Copy,
    Video,
    Other(String),
}

impl OutputType {
    pub fn as_str(&self) -> &str {
        match self {
            OutputType::HeroImage => "hero_image",
            OutputType::Infographic => "infographic",
            OutputType::Copy => "copy",
            OutputType::Video => "video",
            OutputType::Other(name) => name,
        }
    }
}

impl FromStr for OutputType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" => Err(ParseEnumError::new("output type", s)),
            "hero_image" | "hero-image" | "hero" => Ok(OutputType::HeroImage),
            "infographic" => Ok(OutputType::Infographic),
            "copy" => Ok(OutputType::Copy),
            "video" => Ok(OutputType::Video),
            _ => Ok(OutputType::Other(normalized)),
        }
    }
}

impl From<OutputType> for String {
    fn from(value: OutputType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for OutputType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

super::text_column!(OutputType);

/// A unit of marketing work tracked through the status lifecycle
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContentItem {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub status: ContentStatus,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for seeding a content item
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub owner_id: i64,
    pub title: String,
    pub status: ContentStatus,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
}

/// A creative output produced for a content item
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ContentOutput {
    pub id: i64,
    pub content_item_id: i64,
    pub output_type: OutputType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ContentOutput {
    /// Outputs carry their own completion state in `payload.status`
    pub fn is_completed(&self) -> bool {
        self.payload
            .get("status")
            .and_then(|s| s.as_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("completed"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContentOutput {
    pub content_item_id: i64,
    pub output_type: OutputType,
    pub payload: serde_json::Value,
}
