//! Run configuration
//!
//! Everything the engine needs is built once here and handed to components
//! explicitly. Environment variables are only read by [`AppConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::{SyncDomain, SyncMode};

/// Process-level configuration assembled from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    /// Directory holding the universe cache files
    pub cache_dir: PathBuf,
    /// Cron expression for the scheduled run (with seconds)
    pub cron: String,
    pub run_on_start: bool,
    pub api_addr: String,
    /// Keep synchronized data and watermarks in memory instead of PostgreSQL
    pub dry_run: bool,
}

/// Upstream provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    pub token: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_max_size: u32,
}

/// Pacing shared by every upstream call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between consecutive call starts
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Calls per cooldown cycle (0 disables the cooldown)
    #[serde(default = "default_calls_per_cycle")]
    pub calls_per_cycle: u32,

    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Concurrent calls in flight (token count)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Batch retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Attempts per batch, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Randomize each delay between half and the full value
    #[serde(default)]
    pub jitter: bool,
}

/// Effective per-domain knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSettings {
    pub batch_size: usize,
    /// Calendar days re-covered behind the watermark
    pub overlap_days: i64,
    /// Lookback used when no watermark exists
    pub initial_lookback_years: u32,
    /// Lookback used in backfill mode
    pub backfill_years: u32,
    pub inter_batch_delay_ms: u64,
    /// In-batch fetch concurrency (clamped to the limiter's tokens)
    pub max_concurrency: usize,
}

/// Partial override of [`DomainSettings`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainOverride {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub overlap_days: Option<i64>,
    #[serde(default)]
    pub initial_lookback_years: Option<u32>,
    #[serde(default)]
    pub backfill_years: Option<u32>,
    #[serde(default)]
    pub inter_batch_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

/// Parameter object handed to the orchestrator for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Domains to synchronize, in run order
    #[serde(default = "SyncDomain::all")]
    pub domains: Vec<SyncDomain>,

    #[serde(default)]
    pub mode: SyncMode,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Batch size applied to every domain before per-domain overrides
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Rows per INSERT statement
    #[serde(default = "default_write_chunk")]
    pub write_chunk_size: usize,

    #[serde(default)]
    pub parallel_domains: bool,

    /// Age after which another run's marker is considered abandoned
    #[serde(default = "default_run_lock_timeout")]
    pub run_lock_timeout_secs: u64,

    #[serde(default)]
    pub domain_overrides: BTreeMap<SyncDomain, DomainOverride>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            calls_per_cycle: default_calls_per_cycle(),
            cooldown_ms: default_cooldown(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay(),
            jitter: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            domains: SyncDomain::all(),
            mode: SyncMode::Incremental,
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
            batch_size: None,
            write_chunk_size: default_write_chunk(),
            parallel_domains: false,
            run_lock_timeout_secs: default_run_lock_timeout(),
            domain_overrides: BTreeMap::new(),
        }
    }
}

impl DomainSettings {
    /// Built-in settings per domain
    pub fn defaults_for(domain: SyncDomain) -> Self {
        let (batch_size, overlap_days, initial_lookback_years, backfill_years) = match domain {
            SyncDomain::DailyPrice | SyncDomain::WeeklyPrice | SyncDomain::EtfDaily => (50, 5, 1, 3),
            SyncDomain::IndexDaily | SyncDomain::SectorDaily => (20, 5, 1, 3),
            SyncDomain::IndexWeekly => (20, 14, 1, 3),
            SyncDomain::SectorMember => (20, 0, 1, 3),
            SyncDomain::Income | SyncDomain::Cashflow => (20, 365, 3, 3),
            SyncDomain::Dividend => (30, 730, 5, 5),
            // Weights are published monthly
            SyncDomain::IndexWeight => (6, 31, 1, 3),
            SyncDomain::IndexValuation => (6, 5, 1, 3),
            SyncDomain::StockBasic
            | SyncDomain::IndexBasic
            | SyncDomain::EtfBasic
            | SyncDomain::SectorIndex => (10, 0, 1, 1),
        };

        Self {
            batch_size,
            overlap_days,
            initial_lookback_years,
            backfill_years,
            inter_batch_delay_ms: 1000,
            max_concurrency: default_max_concurrency(),
        }
    }

    fn apply(&mut self, o: &DomainOverride) {
        if let Some(v) = o.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = o.overlap_days {
            self.overlap_days = v;
        }
        if let Some(v) = o.initial_lookback_years {
            self.initial_lookback_years = v;
        }
        if let Some(v) = o.backfill_years {
            self.backfill_years = v;
        }
        if let Some(v) = o.inter_batch_delay_ms {
            self.inter_batch_delay_ms = v;
        }
        if let Some(v) = o.max_concurrency {
            self.max_concurrency = v;
        }
    }
}

impl SyncConfig {
    /// Effective settings for `domain`: defaults, then the global batch size,
    /// then the domain's override
    pub fn settings_for(&self, domain: SyncDomain) -> DomainSettings {
        let mut settings = DomainSettings::defaults_for(domain);
        if let Some(size) = self.batch_size {
            settings.batch_size = size;
        }
        if let Some(o) = self.domain_overrides.get(&domain) {
            settings.apply(o);
        }
        settings.max_concurrency = settings
            .max_concurrency
            .clamp(1, self.rate_limit.max_concurrency.max(1));
        settings
    }

    /// Marker staleness threshold; `None` when it overflows a duration
    pub fn run_lock_timeout(&self) -> Option<chrono::Duration> {
        i64::try_from(self.run_lock_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }
        if self.backoff.max_attempts == 0 {
            return Err(invalid("SYNC_MAX_ATTEMPTS", 0));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(invalid("SYNC_BACKOFF_MULTIPLIER", self.backoff.multiplier));
        }
        if self.write_chunk_size == 0 {
            return Err(invalid("SYNC_WRITE_CHUNK", 0));
        }
        if self.rate_limit.max_concurrency == 0 {
            return Err(invalid("SYNC_MAX_CONCURRENCY", 0));
        }
        if self.run_lock_timeout().is_none() {
            return Err(invalid(
                "SYNC_RUN_LOCK_TIMEOUT_SECS",
                self.run_lock_timeout_secs,
            ));
        }
        for domain in &self.domains {
            let settings = self.settings_for(*domain);
            if settings.batch_size == 0 {
                return Err(invalid(&format!("batch_size[{}]", domain), 0));
            }
            if settings.overlap_days < 0 {
                return Err(invalid(
                    &format!("overlap_days[{}]", domain),
                    settings.overlap_days,
                ));
            }
        }
        Ok(())
    }

    /// Copy of this configuration restricted to `domains` and `mode`
    pub fn scoped(&self, domains: Option<Vec<SyncDomain>>, mode: Option<SyncMode>) -> Self {
        let mut scoped = self.clone();
        if let Some(domains) = domains {
            scoped.domains = domains;
        }
        if let Some(mode) = mode {
            scoped.mode = mode;
        }
        scoped
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::Missing(key.to_string()));

        let provider = ProviderConfig {
            api_url: get("TUSHARE_API_URL").unwrap_or_else(default_api_url),
            token: required("TUSHARE_TOKEN")?,
            timeout_secs: parse_or(&get, "TUSHARE_TIMEOUT_SECS", default_timeout())?,
        };

        let dry_run = parse_or(&get, "SYNC_DRY_RUN", false)?;

        let database = DatabaseConfig {
            url: if dry_run {
                get("DATABASE_URL").unwrap_or_default()
            } else {
                required("DATABASE_URL")?
            },
            pool_max_size: parse_or(&get, "DB_POOL_MAX_SIZE", default_pool_size())?,
        };

        let domains = match get("SYNC_DOMAINS") {
            Some(list) => parse_domains(&list)?,
            None => SyncDomain::all(),
        };

        let mode = match get("SYNC_MODE") {
            Some(value) => SyncMode::from_str(&value).ok_or(ConfigError::InvalidValue {
                key: "SYNC_MODE".to_string(),
                value,
            })?,
            None => SyncMode::Incremental,
        };

        let rate_limit = RateLimitConfig {
            min_interval_ms: parse_or(&get, "SYNC_MIN_INTERVAL_MS", default_min_interval())?,
            calls_per_cycle: parse_or(&get, "SYNC_CALLS_PER_CYCLE", default_calls_per_cycle())?,
            cooldown_ms: parse_or(&get, "SYNC_COOLDOWN_MS", default_cooldown())?,
            max_concurrency: parse_or(&get, "SYNC_MAX_CONCURRENCY", default_max_concurrency())?,
        };

        let backoff = BackoffConfig {
            max_attempts: parse_or(&get, "SYNC_MAX_ATTEMPTS", default_max_attempts())?,
            base_delay_ms: parse_or(&get, "SYNC_BACKOFF_BASE_MS", default_base_delay())?,
            multiplier: parse_or(&get, "SYNC_BACKOFF_MULTIPLIER", default_backoff_multiplier())?,
            max_delay_ms: parse_or(&get, "SYNC_BACKOFF_MAX_MS", default_max_delay())?,
            jitter: parse_or(&get, "SYNC_BACKOFF_JITTER", false)?,
        };

        let batch_size = match get("SYNC_BATCH_SIZE") {
            Some(_) => Some(parse_or(&get, "SYNC_BATCH_SIZE", 0usize)?),
            None => None,
        };

        let sync = SyncConfig {
            domains,
            mode,
            rate_limit,
            backoff,
            batch_size,
            write_chunk_size: parse_or(&get, "SYNC_WRITE_CHUNK", default_write_chunk())?,
            parallel_domains: parse_or(&get, "SYNC_PARALLEL_DOMAINS", false)?,
            run_lock_timeout_secs: parse_or(
                &get,
                "SYNC_RUN_LOCK_TIMEOUT_SECS",
                default_run_lock_timeout(),
            )?,
            domain_overrides: BTreeMap::new(),
        };
        sync.validate()?;

        Ok(Self {
            provider,
            database,
            sync,
            cache_dir: PathBuf::from(get("UNIVERSE_CACHE_DIR").unwrap_or_else(|| "./cache".to_string())),
            cron: get("SYNC_CRON").unwrap_or_else(|| "0 30 18 * * *".to_string()),
            run_on_start: parse_or(&get, "SYNC_RUN_ON_START", false)?,
            api_addr: get("API_ADDR").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            dry_run,
        })
    }
}

/// Parse a comma-separated domain list; `all` selects every domain
pub fn parse_domains(list: &str) -> Result<Vec<SyncDomain>, ConfigError> {
    if list.trim().eq_ignore_ascii_case("all") {
        return Ok(SyncDomain::all());
    }

    let mut domains = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let domain = SyncDomain::from_str(name).ok_or_else(|| ConfigError::InvalidValue {
            key: "SYNC_DOMAINS".to_string(),
            value: name.to_string(),
        })?;
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }

    if domains.is_empty() {
        return Err(ConfigError::NoDomains);
    }
    Ok(domains)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

// Default value functions for serde
fn default_api_url() -> String {
    "http://api.tushare.pro".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    10
}

fn default_min_interval() -> u64 {
    500
}

fn default_calls_per_cycle() -> u32 {
    50
}

fn default_cooldown() -> u64 {
    2000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30000
}

fn default_write_chunk() -> usize {
    500
}

fn default_run_lock_timeout() -> u64 {
    6 * 60 * 60
}
