use async_trait::async_trait;

use super::raw::{FetchParams, RawRecord};
use crate::error::FetchError;

/// Raw upstream transport
///
/// Implementations perform exactly one request per call and never throttle;
/// pacing belongs to [`RateLimitedFetchClient`](super::RateLimitedFetchClient).
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Call `api_name` with `params`, requesting the comma-separated `fields`
    async fn call(
        &self,
        api_name: &str,
        params: &FetchParams,
        fields: &str,
    ) -> Result<Vec<RawRecord>, FetchError>;
}
