use market_data_sync::database::repositories::{
    MarketDataRepository, MarketDataRepositoryImpl, SyncStateRepository, SyncStateRepositoryImpl,
};
use market_data_sync::database::establish_connection_pool;
use market_data_sync::provider::{RateLimitedFetchClient, RateLimiter, TushareClient};
use market_data_sync::sync::{
    FileCacheStore, IncrementalWindowPlanner, ProviderUniverseListing, SyncOrchestrator,
    UniverseResolver, UpsertWriter,
};
use market_data_sync::testing::{InMemoryMarketDataRepository, InMemorySyncStateRepository};
use market_data_sync::{create_router, AppConfig, AppState, SyncJob};
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Repositories = (Arc<dyn MarketDataRepository>, Arc<dyn SyncStateRepository>);

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_data_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let Some((market_data_repository, state_repository)) = initialize_database(&config) else {
        std::process::exit(1);
    };

    // Upstream provider behind the shared rate limiter
    let provider = match TushareClient::new(&config.provider) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("❌ Failed to create provider client: {}", e);
            std::process::exit(1);
        }
    };
    let limiter = Arc::new(RateLimiter::new(&config.sync.rate_limit));
    let fetch_client = RateLimitedFetchClient::new(provider, limiter);

    tracing::info!(
        "📡 Provider: {} (min interval {}ms, cooldown {}ms every {} calls, {} tokens)",
        config.provider.api_url,
        config.sync.rate_limit.min_interval_ms,
        config.sync.rate_limit.cooldown_ms,
        config.sync.rate_limit.calls_per_cycle,
        config.sync.rate_limit.max_concurrency
    );

    let resolver = UniverseResolver::new(
        Arc::new(ProviderUniverseListing::new(fetch_client.clone())),
        Arc::new(FileCacheStore::new(config.cache_dir.clone())),
    );
    let writer = UpsertWriter::new(market_data_repository, config.sync.write_chunk_size);

    let orchestrator = SyncOrchestrator::new(
        IncrementalWindowPlanner::default(),
        Arc::new(resolver),
        fetch_client,
        Arc::new(writer),
        state_repository.clone(),
    );
    let sync_job = Arc::new(SyncJob::new(Arc::new(orchestrator), config.sync.clone()));

    tracing::info!(
        "🔄 Domains: {}",
        config
            .sync
            .domains
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    initialize_cron_scheduler(&sync_job, &config.cron).await;

    if config.run_on_start {
        tracing::info!("▶️  Starting initial sync run");
        if let Err(e) = sync_job.spawn_run(None) {
            tracing::error!("❌ Failed to start initial sync run: {}", e);
        }
    }

    let app = create_router(AppState {
        sync_job,
        state_repository,
    });

    let listener = match tokio::net::TcpListener::bind(&config.api_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("❌ Failed to bind {}: {}", config.api_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Market data sync running on http://{}", config.api_addr);
    tracing::info!("📊 Health check: http://{}/api/v1/health", config.api_addr);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", config.api_addr);
    tracing::info!("🔧 Sync control: http://{}/api/v1/sync/*", config.api_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("❌ Server error: {}", e);
    }
}

/// Connect to PostgreSQL, or fall back to in-memory storage in dry-run mode
fn initialize_database(config: &AppConfig) -> Option<Repositories> {
    if config.dry_run {
        tracing::warn!("⚠️  Dry run: synchronized data and watermarks stay in memory");
        let market_data_repository =
            Arc::new(InMemoryMarketDataRepository::new()) as Arc<dyn MarketDataRepository>;
        let state_repository =
            Arc::new(InMemorySyncStateRepository::new()) as Arc<dyn SyncStateRepository>;
        return Some((market_data_repository, state_repository));
    }

    tracing::info!("🗄️  Initializing PostgreSQL connection...");

    let pool = match establish_connection_pool(&config.database.url, config.database.pool_max_size)
    {
        Ok(pool) => {
            tracing::info!("✅ Database connection established successfully");
            pool
        }
        Err(e) => {
            tracing::error!("❌ Failed to establish database connection: {}", e);
            return None;
        }
    };

    let pool_clone = pool.clone();
    let market_data_repository = Arc::new(MarketDataRepositoryImpl::new(move || {
        pool_clone.get_conn()
    })) as Arc<dyn MarketDataRepository>;

    let state_repository =
        Arc::new(SyncStateRepositoryImpl::new(move || pool.get_conn())) as Arc<dyn SyncStateRepository>;

    Some((market_data_repository, state_repository))
}

/// Initialize cron scheduler for the periodic sync run
async fn initialize_cron_scheduler(sync_job: &Arc<SyncJob>, cron: &str) {
    tracing::info!("⏰ Initializing cron scheduler...");

    let scheduler = match JobScheduler::new().await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            tracing::error!("❌ Failed to create cron scheduler: {}", e);
            return;
        }
    };

    if let Err(e) = sync_job.register(&scheduler, cron).await {
        tracing::error!("❌ Failed to register sync job: {}", e);
        return;
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!("❌ Failed to start cron scheduler: {}", e);
        return;
    }

    tracing::info!("✅ Cron scheduler started successfully");
    tracing::info!("   • Market data sync: {}", cron);

    // Keep scheduler alive (it will run in the background)
    std::mem::forget(scheduler);
}
