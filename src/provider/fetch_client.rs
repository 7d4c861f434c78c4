use std::sync::Arc;

use super::client::UpstreamApi;
use super::rate_limiter::RateLimiter;
use super::raw::{FetchParams, RawRecord};
use crate::error::FetchError;
use crate::models::SyncDomain;

/// The only path to the network
///
/// Every upstream request, including universe listings, goes through the shared
/// [`RateLimiter`] here.
#[derive(Clone)]
pub struct RateLimitedFetchClient {
    api: Arc<dyn UpstreamApi>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedFetchClient {
    pub fn new(api: Arc<dyn UpstreamApi>, limiter: Arc<RateLimiter>) -> Self {
        Self { api, limiter }
    }

    /// Fetch raw rows for a data domain
    pub async fn fetch(
        &self,
        domain: SyncDomain,
        params: &FetchParams,
    ) -> Result<Vec<RawRecord>, FetchError> {
        self.call(domain.api_name(), params, domain.fields()).await
    }

    /// Issue a paced call to an arbitrary API
    ///
    /// An empty result is reported as [`FetchError::NotFound`].
    pub async fn call(
        &self,
        api_name: &str,
        params: &FetchParams,
        fields: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let _permit = self.limiter.acquire().await?;

        tracing::debug!("Calling {} with {:?}", api_name, params.ts_code);

        match self.api.call(api_name, params, fields).await {
            Ok(rows) if rows.is_empty() => {
                tracing::debug!("{} returned no rows for {:?}", api_name, params.ts_code);
                Err(FetchError::NotFound {
                    api: api_name.to_string(),
                })
            }
            Ok(rows) => {
                tracing::debug!("{} returned {} rows", api_name, rows.len());
                Ok(rows)
            }
            Err(FetchError::NotFound { api }) => {
                tracing::debug!("{} returned no rows for {:?}", api, params.ts_code);
                Err(FetchError::NotFound { api })
            }
            Err(e) => {
                tracing::debug!("{} call failed: {}", api_name, e);
                Err(e)
            }
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::testing::ScriptedUpstream;
    use serde_json::json;

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(&RateLimitConfig {
            min_interval_ms: 0,
            calls_per_cycle: 0,
            cooldown_ms: 0,
            max_concurrency: 4,
        }))
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let upstream = Arc::new(ScriptedUpstream::new(|_, _| Ok(vec![])));
        let client = RateLimitedFetchClient::new(upstream.clone(), limiter());

        let err = client
            .fetch(SyncDomain::Dividend, &FetchParams::for_ticker("600000.SH"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FetchError::NotFound {
                api: "dividend".to_string()
            }
        );
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_uses_domain_api_and_counts_calls() {
        let upstream = Arc::new(ScriptedUpstream::new(|api, params| {
            Ok(vec![RawRecord::from_json(json!({
                "api": api,
                "ts_code": params.ts_code.clone(),
            }))
            .unwrap()])
        }));
        let client = RateLimitedFetchClient::new(upstream.clone(), limiter());

        let rows = client
            .fetch(SyncDomain::EtfDaily, &FetchParams::for_ticker("510300.SH"))
            .await
            .unwrap();

        assert_eq!(rows[0].get_str("api").as_deref(), Some("fund_daily"));
        assert_eq!(client.limiter().total_calls(), 1);
        assert_eq!(upstream.calls()[0].api_name, "fund_daily");
    }
}
