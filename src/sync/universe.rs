//! Ticker universe resolution
//!
//! Resolution order per universe kind:
//! 1. live listing through the fetch client (overwrites the cache on success)
//! 2. cached listing younger than the TTL
//! 3. built-in static list
//!
//! Only an empty static list is an error.
//!
//! Domains with a built-in query set (major indexes, exchange segments) skip
//! the listing entirely.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CacheError, ConfigError, FetchError};
use crate::models::{
    ListingStatus, SyncDomain, Ticker, UniverseKind, UniverseSnapshot, UniverseSource,
};
use crate::provider::{FetchParams, RateLimitedFetchClient, RawRecord};

/// Cached snapshots older than this are ignored
pub const UNIVERSE_CACHE_TTL_DAYS: i64 = 7;

/// Code prefixes outside the main boards (growth boards, Beijing, B shares)
const EXCLUDED_EQUITY_PREFIXES: [&str; 6] = ["300", "688", "830", "430", "200", "900"];

/// Live source of a universe listing
#[async_trait]
pub trait UniverseListing: Send + Sync {
    async fn list(&self, kind: UniverseKind) -> Result<Vec<Ticker>, FetchError>;
}

/// Persisted form of a universe: identifiers plus one fetch timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedUniverse {
    pub fetched_at: DateTime<Utc>,
    pub tickers: Vec<String>,
}

/// Storage for the last live listing of each universe kind
pub trait UniverseCacheStore: Send + Sync {
    fn load(&self, kind: UniverseKind) -> Result<Option<CachedUniverse>, CacheError>;

    fn store(&self, kind: UniverseKind, universe: &CachedUniverse) -> Result<(), CacheError>;
}

/// One JSON file per universe kind, replaced atomically via rename
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, kind: UniverseKind) -> PathBuf {
        self.dir.join(format!("{}_universe.json", kind))
    }
}

impl UniverseCacheStore for FileCacheStore {
    fn load(&self, kind: UniverseKind) -> Result<Option<CachedUniverse>, CacheError> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn store(&self, kind: UniverseKind, universe: &CachedUniverse) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(kind);
        let tmp = tmp_path(&path);
        fs::write(&tmp, serde_json::to_vec_pretty(universe)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Listings served by the upstream provider
pub struct ProviderUniverseListing {
    client: RateLimitedFetchClient,
}

impl ProviderUniverseListing {
    pub fn new(client: RateLimitedFetchClient) -> Self {
        Self { client }
    }

    async fn codes(
        &self,
        api_name: &str,
        params: FetchParams,
        fields: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        match self.client.call(api_name, &params, fields).await {
            Err(FetchError::NotFound { .. }) => Ok(Vec::new()),
            other => other,
        }
    }
}

#[async_trait]
impl UniverseListing for ProviderUniverseListing {
    async fn list(&self, kind: UniverseKind) -> Result<Vec<Ticker>, FetchError> {
        let tickers = match kind {
            UniverseKind::Equity => {
                let rows = self
                    .codes(
                        "stock_basic",
                        FetchParams::new().with("list_status", "L"),
                        "ts_code,symbol,name,list_status",
                    )
                    .await?;
                rows.iter()
                    .filter_map(|row| {
                        let code = row.get_str("ts_code")?;
                        let status = row.get_str("list_status").unwrap_or_else(|| "L".to_string());
                        Some(Ticker::new(code, ListingStatus::from_code(&status)))
                    })
                    .filter(|t| is_main_board(&t.symbol))
                    .collect()
            }
            UniverseKind::Index => {
                let mut tickers = Vec::new();
                for market in ["SSE", "SZSE"] {
                    let rows = self
                        .codes(
                            "index_basic",
                            FetchParams::new().with("market", market),
                            "ts_code,name,market",
                        )
                        .await?;
                    tickers.extend(listed(&rows));
                }
                tickers
            }
            UniverseKind::Etf => {
                let rows = self
                    .codes(
                        "fund_basic",
                        FetchParams::new().with("market", "E").with("status", "L"),
                        "ts_code,name,status",
                    )
                    .await?;
                listed(&rows)
            }
            UniverseKind::Sector => {
                let mut tickers = Vec::new();
                for index_type in ["N", "I"] {
                    let rows = self
                        .codes(
                            "ths_index",
                            FetchParams::new().with("exchange", "A").with("type", index_type),
                            "ts_code,name,count,exchange,type",
                        )
                        .await?;
                    tickers.extend(listed(&rows));
                }
                tickers
            }
        };

        Ok(tickers)
    }
}

fn listed(rows: &[RawRecord]) -> Vec<Ticker> {
    rows.iter()
        .filter_map(|row| row.get_str("ts_code"))
        .map(|code| Ticker::new(code, ListingStatus::Listed))
        .collect()
}

/// Main-board equity filter
pub fn is_main_board(code: &str) -> bool {
    !EXCLUDED_EQUITY_PREFIXES
        .iter()
        .any(|prefix| code.starts_with(prefix))
}

/// Built-in fallback list for a universe kind
pub fn static_universe(kind: UniverseKind) -> Vec<String> {
    let codes: &[&str] = match kind {
        UniverseKind::Equity => &[
            "600000.SH", "600036.SH", "600519.SH", "600887.SH", "601318.SH", "601398.SH",
            "601857.SH", "601988.SH", "600028.SH", "600030.SH", "600050.SH", "600104.SH",
            "600276.SH", "600690.SH", "600900.SH", "601012.SH", "601166.SH", "601288.SH",
            "601328.SH", "601668.SH", "601888.SH", "601939.SH", "000001.SZ", "000002.SZ",
            "000063.SZ", "000100.SZ", "000333.SZ", "000338.SZ", "000858.SZ", "000895.SZ",
            "001979.SZ", "002027.SZ", "002142.SZ", "002230.SZ", "002304.SZ", "002352.SZ",
            "002415.SZ", "002475.SZ", "002594.SZ", "002714.SZ",
        ],
        UniverseKind::Index => &[
            "000001.SH", "000016.SH", "000300.SH", "000905.SH", "000852.SH", "399001.SZ",
            "399005.SZ", "399006.SZ",
        ],
        UniverseKind::Etf => &[
            "510050.SH", "510300.SH", "510500.SH", "512100.SH", "512880.SH", "512480.SH",
            "515030.SH", "588000.SH", "159915.SZ", "159919.SZ", "159949.SZ", "159995.SZ",
        ],
        UniverseKind::Sector => &[
            "885311.TI", "885338.TI", "885362.TI", "885431.TI", "885517.TI", "885760.TI",
            "881101.TI", "881121.TI", "881155.TI", "881157.TI",
        ],
    };
    codes.iter().map(|c| c.to_string()).collect()
}

pub struct UniverseResolver {
    listing: Arc<dyn UniverseListing>,
    cache: Arc<dyn UniverseCacheStore>,
    static_lists: HashMap<UniverseKind, Vec<String>>,
    ttl: Duration,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl UniverseResolver {
    pub fn new(listing: Arc<dyn UniverseListing>, cache: Arc<dyn UniverseCacheStore>) -> Self {
        let static_lists = [
            UniverseKind::Equity,
            UniverseKind::Index,
            UniverseKind::Etf,
            UniverseKind::Sector,
        ]
        .into_iter()
        .map(|kind| (kind, static_universe(kind)))
        .collect();

        Self {
            listing,
            cache,
            static_lists,
            ttl: Duration::days(UNIVERSE_CACHE_TTL_DAYS),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the built-in fallback list for `kind`
    pub fn with_static_list(mut self, kind: UniverseKind, codes: Vec<String>) -> Self {
        self.static_lists.insert(kind, codes);
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Fail fast when any requested kind has no fallback
    pub fn check_static_lists(
        &self,
        kinds: impl IntoIterator<Item = UniverseKind>,
    ) -> Result<(), ConfigError> {
        for kind in kinds {
            if self.static_list(kind).is_empty() {
                return Err(ConfigError::EmptyStaticUniverse(kind));
            }
        }
        Ok(())
    }

    fn static_list(&self, kind: UniverseKind) -> &[String] {
        self.static_lists
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub async fn resolve(&self, domain: SyncDomain) -> Result<UniverseSnapshot, ConfigError> {
        let now = (self.clock)();
        let Some(kind) = domain.universe_kind() else {
            let codes = domain.fixed_universe().unwrap_or_default();
            tracing::info!("Using built-in query set for {}: {:?}", domain, codes);
            let tickers = codes.iter().map(|c| Ticker::from_symbol(*c)).collect();
            return Ok(UniverseSnapshot::new(domain, tickers, now, UniverseSource::Static));
        };

        match self.listing.list(kind).await {
            Ok(tickers) if !tickers.is_empty() => {
                let snapshot = UniverseSnapshot::new(domain, tickers, now, UniverseSource::Live);
                let cached = CachedUniverse {
                    fetched_at: now,
                    tickers: snapshot.symbols(),
                };
                if let Err(e) = self.cache.store(kind, &cached) {
                    tracing::warn!("Failed to write {} universe cache: {}", kind, e);
                }
                tracing::info!(
                    "Resolved {} universe live for {}: {} tickers",
                    kind,
                    domain,
                    snapshot.len()
                );
                return Ok(snapshot);
            }
            Ok(_) => tracing::warn!("Live {} universe listing was empty", kind),
            Err(e) => tracing::warn!("Live {} universe listing failed: {}", kind, e),
        }

        match self.cache.load(kind) {
            Ok(Some(cached)) if now - cached.fetched_at < self.ttl && !cached.tickers.is_empty() => {
                tracing::info!(
                    "Using cached {} universe for {} ({} tickers, fetched {})",
                    kind,
                    domain,
                    cached.tickers.len(),
                    cached.fetched_at
                );
                let tickers = cached.tickers.into_iter().map(Ticker::from_symbol).collect();
                return Ok(UniverseSnapshot::new(
                    domain,
                    tickers,
                    cached.fetched_at,
                    UniverseSource::Cache,
                ));
            }
            Ok(Some(cached)) => tracing::info!(
                "Cached {} universe is stale (fetched {})",
                kind,
                cached.fetched_at
            ),
            Ok(None) => tracing::debug!("No cached {} universe", kind),
            Err(e) => tracing::warn!("Failed to read {} universe cache: {}", kind, e),
        }

        let codes = self.static_list(kind);
        if codes.is_empty() {
            return Err(ConfigError::EmptyStaticUniverse(kind));
        }

        tracing::warn!(
            "⚠️  Falling back to static {} universe for {} ({} tickers)",
            kind,
            domain,
            codes.len()
        );
        let tickers = codes.iter().cloned().map(Ticker::from_symbol).collect();
        Ok(UniverseSnapshot::new(domain, tickers, now, UniverseSource::Static))
    }
}
