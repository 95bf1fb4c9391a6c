//! Application constants

/// Approved platform posts a product needs before its drafts move to review
pub const REQUIRED_APPROVED_POSTS: i64 = 3;

/// Tokens expiring within this many days are refreshed proactively
pub const TOKEN_EXPIRY_WARNING_DAYS: i64 = 7;

/// OAuth state values older than this are rejected
pub const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Default wait between container status polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default number of container status polls before giving up
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Default Graph API version
pub const DEFAULT_GRAPH_VERSION: &str = "v19.0";

/// Permissions requested when connecting Facebook pages and Instagram accounts
pub const META_OAUTH_SCOPES: &[&str] = &[
    "pages_show_list",
    "pages_read_engagement",
    "pages_manage_posts",
    "instagram_basic",
    "instagram_content_publish",
    "business_management",
];

/// Lifetime assumed for a long-lived token when the provider omits `expires_in`
pub const LONG_LIVED_TOKEN_DAYS: i64 = 60;
