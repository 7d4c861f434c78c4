use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::database::repositories::MarketDataRepository;
use crate::error::PersistenceError;
use crate::models::{dedupe_by_key, Record, SyncDomain};

/// Destination of a batch's fetched records
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Persist `records`, returning the number of rows affected
    async fn write(&self, domain: SyncDomain, records: Vec<Record>) -> Result<usize, PersistenceError>;
}

/// Natural-key upserts, serialized per domain
///
/// Different domains write concurrently; writes for one domain queue behind a
/// per-domain lock so two upserts never race on the same key.
pub struct UpsertWriter {
    repository: Arc<dyn MarketDataRepository>,
    chunk_size: usize,
    locks: Mutex<HashMap<SyncDomain, Arc<tokio::sync::Mutex<()>>>>,
}

impl UpsertWriter {
    pub fn new(repository: Arc<dyn MarketDataRepository>, chunk_size: usize) -> Self {
        Self {
            repository,
            chunk_size: chunk_size.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, domain: SyncDomain) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(domain).or_default().clone()
    }

    pub async fn write(
        &self,
        domain: SyncDomain,
        records: Vec<Record>,
    ) -> Result<usize, PersistenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let unique = dedupe_by_key(&records);
        if unique.len() < records.len() {
            tracing::debug!(
                "Collapsed {} duplicate {} records",
                records.len() - unique.len(),
                domain
            );
        }

        let lock = self.lock_for(domain);
        let _guard = lock.lock().await;

        let repository = self.repository.clone();
        let chunk_size = self.chunk_size;
        let affected = tokio::task::spawn_blocking(move || {
            repository.upsert(domain, &unique, chunk_size)
        })
        .await
        .map_err(|e| PersistenceError::TaskError(e.to_string()))??;

        tracing::debug!("Upserted {} {} rows", affected, domain);
        Ok(affected)
    }
}

#[async_trait]
impl BatchSink for UpsertWriter {
    async fn write(&self, domain: SyncDomain, records: Vec<Record>) -> Result<usize, PersistenceError> {
        UpsertWriter::write(self, domain, records).await
    }
}
