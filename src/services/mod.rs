pub mod error;
pub mod insights;
pub mod meta;
pub mod platform;
pub mod promotion;
pub mod publisher;
pub mod scheduler;
pub mod session;
pub mod tokens;
pub mod transitions;

#[cfg(test)]
pub mod testing;
