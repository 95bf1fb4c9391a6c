//! Social domain - connected accounts and multi-account posts

pub mod models;

pub use models::*;
