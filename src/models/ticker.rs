use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use utoipa::ToSchema;

use super::domain::SyncDomain;

/// Listing exchange, derived from the code suffix when not provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exchange {
    Sse,
    Szse,
    Bse,
    Unknown,
}

impl Exchange {
    /// `600000.SH` -> SSE, `000001.SZ` -> SZSE, `830799.BJ` -> BSE
    pub fn from_code(code: &str) -> Self {
        match code.rsplit_once('.').map(|(_, suffix)| suffix) {
            Some("SH") => Exchange::Sse,
            Some("SZ") => Exchange::Szse,
            Some("BJ") => Exchange::Bse,
            _ => Exchange::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Listed,
    Delisted,
    Suspended,
    /// Snapshot came from a source that only stores identifiers
    Unknown,
}

impl ListingStatus {
    /// Upstream `list_status` column: L / D / P
    pub fn from_code(code: &str) -> Self {
        match code {
            "L" => ListingStatus::Listed,
            "D" => ListingStatus::Delisted,
            "P" => ListingStatus::Suspended,
            _ => ListingStatus::Unknown,
        }
    }
}

/// A tradable instrument; identity is the symbol string
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ticker {
    /// Provider code (e.g., "600519.SH")
    pub symbol: String,
    pub exchange: Exchange,
    pub status: ListingStatus,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, status: ListingStatus) -> Self {
        let symbol = symbol.into();
        Self {
            exchange: Exchange::from_code(&symbol),
            symbol,
            status,
        }
    }

    /// Ticker restored from an identifier-only source (cache or static list)
    pub fn from_symbol(symbol: impl Into<String>) -> Self {
        Self::new(symbol, ListingStatus::Unknown)
    }
}

impl PartialEq for Ticker {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl Eq for Ticker {}

impl Hash for Ticker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.symbol.hash(state);
    }
}

/// Provenance of a universe snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UniverseSource {
    Live,
    Cache,
    Static,
}

/// The ticker set a domain synchronizes against
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UniverseSnapshot {
    pub domain: SyncDomain,
    /// Ordered, duplicate-free
    pub tickers: Vec<Ticker>,
    pub fetched_at: DateTime<Utc>,
    pub source: UniverseSource,
}

impl UniverseSnapshot {
    /// Build a snapshot, dropping duplicate symbols while keeping first-seen order
    pub fn new(
        domain: SyncDomain,
        tickers: Vec<Ticker>,
        fetched_at: DateTime<Utc>,
        source: UniverseSource,
    ) -> Self {
        let mut seen = HashSet::with_capacity(tickers.len());
        let tickers = tickers
            .into_iter()
            .filter(|t| !t.symbol.is_empty() && seen.insert(t.symbol.clone()))
            .collect();

        Self {
            domain,
            tickers,
            fetched_at,
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tickers.iter().map(|t| t.symbol.clone()).collect()
    }
}
