//! GitHub REST API access with explicit rate-limit budgeting.

pub mod budget;
pub mod client;

pub use budget::RateLimitBudget;
pub use client::RateLimitedClient;
