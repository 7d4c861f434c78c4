use std::sync::Arc;

use super::{
    FixedUniverseListing, InMemoryCacheStore, InMemoryMarketDataRepository,
    InMemorySyncStateRepository, ScriptedUpstream,
};
use crate::config::{DomainOverride, RateLimitConfig, SyncConfig};
use crate::models::SyncDomain;
use crate::provider::{RateLimitedFetchClient, RateLimiter};
use crate::sync::{
    IncrementalWindowPlanner, NoDelayBackoff, SyncOrchestrator, UniverseResolver, UpsertWriter,
};

/// Orchestrator wired entirely to in-memory collaborators, with no pacing or backoff
pub fn scripted_orchestrator(
    upstream: Arc<ScriptedUpstream>,
    codes: &[&str],
    data: Arc<InMemoryMarketDataRepository>,
    state: Arc<InMemorySyncStateRepository>,
) -> SyncOrchestrator {
    let limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
        min_interval_ms: 0,
        calls_per_cycle: 0,
        cooldown_ms: 0,
        max_concurrency: 4,
    }));
    let resolver = UniverseResolver::new(
        Arc::new(FixedUniverseListing::with_codes(codes)),
        Arc::new(InMemoryCacheStore::new()),
    );

    SyncOrchestrator::new(
        IncrementalWindowPlanner::default(),
        Arc::new(resolver),
        RateLimitedFetchClient::new(upstream, limiter),
        Arc::new(UpsertWriter::new(data, 500)),
        state,
    )
    .with_backoff(Arc::new(NoDelayBackoff::new(1)))
}

/// Configuration for `domains` with no delay between batches
pub fn quick_config(domains: &[SyncDomain]) -> SyncConfig {
    let mut config = SyncConfig {
        domains: domains.to_vec(),
        ..SyncConfig::default()
    };
    for domain in domains {
        config.domain_overrides.insert(
            *domain,
            DomainOverride {
                inter_batch_delay_ms: Some(0),
                ..DomainOverride::default()
            },
        );
    }
    config
}
