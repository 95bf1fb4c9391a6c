//! Social domain models

mod account;
mod post;

pub use account::{NewSocialAccount, Provider, SocialAccount, TokenStatus};
pub use post::{
    DeliveryOutcome, MediaItem, MediaKind, PlatformStatus, PostStatus, PostType, SocialPost,
    SocialPostAccount,
};
#[cfg(test)]
pub use post::NewSocialPost;
