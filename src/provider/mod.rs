//! Upstream provider access
//!
//! - [`UpstreamApi`]: raw transport (HTTP in production, scripted in tests)
//! - [`RateLimiter`]: shared pacing and concurrency tokens
//! - [`RateLimitedFetchClient`]: the single chokepoint combining both

pub mod client;
pub mod fetch_client;
pub mod rate_limiter;
pub mod raw;
pub mod tushare;

pub use client::UpstreamApi;
pub use fetch_client::RateLimitedFetchClient;
pub use rate_limiter::RateLimiter;
pub use raw::{FetchParams, RawRecord, UPSTREAM_DATE_FORMAT};
pub use tushare::TushareClient;
