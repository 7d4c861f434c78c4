//! Error types for the synchronization engine
//!
//! Failures are scoped: per-ticker and per-record errors stay inside their batch,
//! per-batch errors stay inside their domain, and per-domain errors stay inside the run.
//! Only configuration problems detected before any domain starts escape
//! [`SyncOrchestrator::run`](crate::sync::SyncOrchestrator::run).

use thiserror::Error;

use crate::models::{SyncDomain, UniverseKind};

pub use crate::database::connection::PersistenceError;

/// Errors raised by the upstream fetch layer
///
/// # Error Categories
///
/// - **Retryable**: `Transient`, `RateLimitExceeded`
/// - **Fatal for the domain**: `Permission`
/// - **Not an error**: `NotFound` (valid call, empty result)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Network failure, timeout, or an upstream hiccup worth retrying
    #[error("Transient upstream error: {0}")]
    Transient(String),

    /// The account's call quota was exceeded
    #[error("Rate limit exceeded on {api}: {message}")]
    RateLimitExceeded { api: String, message: String },

    /// The account is not entitled to this API
    #[error("Permission denied on {api}: {message}")]
    Permission { api: String, message: String },

    /// The call succeeded but returned no rows
    #[error("No data returned by {api}")]
    NotFound { api: String },
}

impl FetchError {
    /// Returns true if the call may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient(_) | FetchError::RateLimitExceeded { .. }
        )
    }

    /// Returns true if the upstream throttled us
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimitExceeded { .. })
    }

    /// Returns true if the entitlement is insufficient for the API
    pub fn is_permission(&self) -> bool {
        matches!(self, FetchError::Permission { .. })
    }
}

/// A single upstream row that could not be turned into a record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid {domain} record for {ticker}: {reason}")]
pub struct DataValidationError {
    pub domain: SyncDomain,
    pub ticker: String,
    pub reason: String,
}

impl DataValidationError {
    pub fn new(domain: SyncDomain, ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            domain,
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }
}

/// Universe cache store failures
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Configuration problems; fatal before a run starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Static fallback universe for {0} is empty")]
    EmptyStaticUniverse(UniverseKind),

    #[error("No domains selected for synchronization")]
    NoDomains,

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Umbrella error for the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("A synchronization run is already in progress")]
    RunInProgress,
}

impl SyncError {
    /// Returns true if this error aborts a run before any domain starts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::Persistence(_) | SyncError::RunInProgress
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_categories() {
        assert!(FetchError::Transient("timeout".to_string()).is_retryable());
        assert!(FetchError::RateLimitExceeded {
            api: "daily".to_string(),
            message: "200/min".to_string(),
        }
        .is_retryable());
        assert!(!FetchError::Permission {
            api: "ths_member".to_string(),
            message: "points".to_string(),
        }
        .is_retryable());
        assert!(!FetchError::NotFound {
            api: "daily".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = DataValidationError::new(SyncDomain::DailyPrice, "600000.SH", "high < low");
        assert_eq!(
            err.to_string(),
            "Invalid daily_price record for 600000.SH: high < low"
        );

        let err = SyncError::from(ConfigError::EmptyStaticUniverse(UniverseKind::Etf));
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Configuration error: Static fallback universe for etf is empty"
        );
    }
}
