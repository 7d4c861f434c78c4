use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{CacheError, FetchError};
use crate::models::{ListingStatus, Ticker, UniverseKind};
use crate::sync::universe::{CachedUniverse, UniverseCacheStore, UniverseListing};

/// Listing that returns the same codes for every universe kind, or always fails
pub struct FixedUniverseListing {
    result: Result<Vec<String>, FetchError>,
    calls: Mutex<u32>,
}

impl FixedUniverseListing {
    pub fn with_codes(codes: &[&str]) -> Self {
        Self {
            result: Ok(codes.iter().map(|c| c.to_string()).collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            result: Err(error),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl UniverseListing for FixedUniverseListing {
    async fn list(&self, _kind: UniverseKind) -> Result<Vec<Ticker>, FetchError> {
        *self.calls.lock() += 1;
        self.result.clone().map(|codes| {
            codes
                .into_iter()
                .map(|code| Ticker::new(code, ListingStatus::Listed))
                .collect()
        })
    }
}

#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<UniverseKind, CachedUniverse>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UniverseCacheStore for InMemoryCacheStore {
    fn load(&self, kind: UniverseKind) -> Result<Option<CachedUniverse>, CacheError> {
        Ok(self.entries.lock().get(&kind).cloned())
    }

    fn store(&self, kind: UniverseKind, universe: &CachedUniverse) -> Result<(), CacheError> {
        self.entries.lock().insert(kind, universe.clone());
        Ok(())
    }
}
