use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::database::models::SyncStateRow;
use crate::database::repositories::{MarketDataRepository, SyncStateRepository};
use crate::error::PersistenceError;
use crate::models::{NaturalKey, Record, SyncDomain};

/// Market data tables held in memory, with the same merge rules as the SQL upsert
#[derive(Default)]
pub struct InMemoryMarketDataRepository {
    tables: Mutex<HashMap<SyncDomain, BTreeMap<NaturalKey, Record>>>,
    failures: Mutex<u32>,
}

impl InMemoryMarketDataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upserts fail without writing anything
    pub fn fail_next_writes(&self, n: u32) {
        *self.failures.lock() = n;
    }

    /// Stored rows in natural-key order
    pub fn records(&self, domain: SyncDomain) -> Vec<Record> {
        self.tables
            .lock()
            .get(&domain)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, domain: SyncDomain, key: &NaturalKey) -> Option<Record> {
        self.tables.lock().get(&domain)?.get(key).cloned()
    }
}

impl MarketDataRepository for InMemoryMarketDataRepository {
    fn upsert(
        &self,
        domain: SyncDomain,
        records: &[Record],
        _chunk_size: usize,
    ) -> Result<usize, PersistenceError> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(PersistenceError::QueryError(
                    "injected write failure".to_string(),
                ));
            }
        }

        let mut tables = self.tables.lock();
        let table = tables.entry(domain).or_default();
        for record in records {
            let key = record.natural_key();
            let merged = match table.get(&key) {
                Some(prior) => record.clone().merged_over(prior),
                None => record.clone(),
            };
            table.insert(key, merged);
        }
        Ok(records.len())
    }

    fn count(&self, domain: SyncDomain) -> Result<i64, PersistenceError> {
        Ok(self.tables.lock().get(&domain).map_or(0, |t| t.len() as i64))
    }
}

/// `sync_state` held in memory
#[derive(Default)]
pub struct InMemorySyncStateRepository {
    rows: Mutex<BTreeMap<SyncDomain, SyncStateRow>>,
    ping_error: Mutex<Option<String>>,
    ping_delay: Mutex<Option<Duration>>,
}

impl InMemorySyncStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(self, domain: SyncDomain, date: NaiveDate) -> Self {
        self.row_mut(domain, |row| row.last_synced_at = Some(date));
        self
    }

    /// Pretend another run holds the domain's marker since `started_at`
    pub fn with_marker(self, domain: SyncDomain, owner: &str, started_at: DateTime<Utc>) -> Self {
        self.row_mut(domain, |row| {
            row.run_owner = Some(owner.to_string());
            row.run_started_at = Some(started_at);
        });
        self
    }

    /// Make `ping` fail with a connection error
    pub fn unreachable(self, message: &str) -> Self {
        *self.ping_error.lock() = Some(message.to_string());
        self
    }

    /// Block the calling thread inside `ping`
    pub fn with_slow_ping(self, delay: Duration) -> Self {
        *self.ping_delay.lock() = Some(delay);
        self
    }

    pub fn watermark(&self, domain: SyncDomain) -> Option<NaiveDate> {
        self.rows.lock().get(&domain).and_then(|r| r.last_synced_at)
    }

    pub fn marker(&self, domain: SyncDomain) -> Option<String> {
        self.rows.lock().get(&domain).and_then(|r| r.run_owner.clone())
    }

    fn row_mut<T>(&self, domain: SyncDomain, f: impl FnOnce(&mut SyncStateRow) -> T) -> T {
        let mut rows = self.rows.lock();
        let row = rows.entry(domain).or_insert_with(|| SyncStateRow {
            domain: domain.as_str().to_string(),
            last_synced_at: None,
            run_owner: None,
            run_started_at: None,
            updated_at: Utc::now(),
        });
        row.updated_at = Utc::now();
        f(row)
    }
}

impl SyncStateRepository for InMemorySyncStateRepository {
    fn ping(&self) -> Result<(), PersistenceError> {
        let delay = *self.ping_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        match self.ping_error.lock().clone() {
            Some(message) => Err(PersistenceError::ConnectionFailed(message)),
            None => Ok(()),
        }
    }

    fn load_watermark(&self, domain: SyncDomain) -> Result<Option<NaiveDate>, PersistenceError> {
        Ok(self.watermark(domain))
    }

    fn try_acquire_run(
        &self,
        domain: SyncDomain,
        owner: &str,
        stale_after: chrono::Duration,
    ) -> Result<bool, PersistenceError> {
        let now = Utc::now();
        Ok(self.row_mut(domain, |row| {
            if !row.is_claimable_by(owner, now, stale_after) {
                return false;
            }
            row.run_owner = Some(owner.to_string());
            row.run_started_at = Some(now);
            true
        }))
    }

    fn release_run(&self, domain: SyncDomain, owner: &str) -> Result<(), PersistenceError> {
        self.row_mut(domain, |row| {
            if row.run_owner.as_deref() == Some(owner) {
                row.run_owner = None;
                row.run_started_at = None;
            }
        });
        Ok(())
    }

    fn commit_watermark(
        &self,
        domain: SyncDomain,
        date: NaiveDate,
        owner: &str,
    ) -> Result<NaiveDate, PersistenceError> {
        self.row_mut(domain, |row| {
            if row.run_owner.as_deref() != Some(owner) {
                return Err(PersistenceError::RunMarkerLost(domain.to_string()));
            }
            let watermark = row.last_synced_at.map_or(date, |prev| prev.max(date));
            row.last_synced_at = Some(watermark);
            Ok(watermark)
        })
    }

    fn list(&self) -> Result<Vec<SyncStateRow>, PersistenceError> {
        let mut rows: Vec<SyncStateRow> = self.rows.lock().values().cloned().collect();
        rows.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_commit_keeps_maximum() {
        let repo = InMemorySyncStateRepository::new().with_watermark(SyncDomain::Income, date(10));
        assert!(repo
            .try_acquire_run(SyncDomain::Income, "run-a", chrono::Duration::hours(1))
            .unwrap());

        assert_eq!(repo.commit_watermark(SyncDomain::Income, date(5), "run-a").unwrap(), date(10));
        assert_eq!(repo.commit_watermark(SyncDomain::Income, date(12), "run-a").unwrap(), date(12));
        assert!(matches!(
            repo.commit_watermark(SyncDomain::Income, date(13), "run-b"),
            Err(PersistenceError::RunMarkerLost(_))
        ));
    }

    #[test]
    fn test_marker_blocks_other_owner_until_released() {
        let repo = InMemorySyncStateRepository::new();
        let timeout = chrono::Duration::hours(1);

        assert!(repo.try_acquire_run(SyncDomain::Dividend, "run-a", timeout).unwrap());
        assert!(!repo.try_acquire_run(SyncDomain::Dividend, "run-b", timeout).unwrap());

        repo.release_run(SyncDomain::Dividend, "run-b").unwrap();
        assert_eq!(repo.marker(SyncDomain::Dividend).as_deref(), Some("run-a"));

        repo.release_run(SyncDomain::Dividend, "run-a").unwrap();
        assert!(repo.try_acquire_run(SyncDomain::Dividend, "run-b", timeout).unwrap());
    }
}
