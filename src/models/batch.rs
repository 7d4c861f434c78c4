use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::domain::SyncDomain;

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,
    InProgress,
    /// Every ticker fetched and persisted
    Success,
    /// Some tickers succeeded
    Partial,
    /// No ticker succeeded after retry exhaustion
    Failed,
}

impl BatchStatus {
    /// Terminal status from the number of tickers that made it to the database
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if total > 0 && succeeded >= total {
            BatchStatus::Success
        } else if succeeded > 0 {
            BatchStatus::Partial
        } else if total == 0 {
            BatchStatus::Success
        } else {
            BatchStatus::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Success | BatchStatus::Partial | BatchStatus::Failed
        )
    }
}

/// A ticker that failed terminally, with the last error seen for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TickerFailure {
    pub ticker: String,
    pub reason: String,
}

/// A bounded slice of the universe processed under one cooldown cycle
///
/// Owned by the scheduler until terminal, then reported to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchJob {
    pub domain: SyncDomain,
    /// Position in the scheduler's batch order
    pub index: usize,
    pub tickers: Vec<String>,
    pub attempt_count: u32,
    pub status: BatchStatus,
    pub succeeded: Vec<String>,
    pub failed: Vec<TickerFailure>,
    pub rows_written: usize,
    /// Upstream rows dropped by validation
    pub rejected_records: usize,
    /// The upstream throttled at least one call in this batch
    pub rate_limited: bool,
    /// The account lacks entitlement for this domain's API
    pub permission_denied: bool,
    /// Fetched rows were still unpersisted when retries ran out
    pub write_failed: bool,
}

impl BatchJob {
    pub fn new(domain: SyncDomain, index: usize, tickers: Vec<String>) -> Self {
        Self {
            domain,
            index,
            tickers,
            attempt_count: 0,
            status: BatchStatus::Pending,
            succeeded: Vec::new(),
            failed: Vec::new(),
            rows_written: 0,
            rejected_records: 0,
            rate_limited: false,
            permission_denied: false,
            write_failed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn failed_tickers(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|f| f.ticker.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_counts() {
        assert_eq!(BatchStatus::from_counts(3, 3), BatchStatus::Success);
        assert_eq!(BatchStatus::from_counts(2, 3), BatchStatus::Partial);
        assert_eq!(BatchStatus::from_counts(0, 3), BatchStatus::Failed);
        assert_eq!(BatchStatus::from_counts(0, 0), BatchStatus::Success);
    }

    #[test]
    fn test_new_batch_is_pending() {
        let job = BatchJob::new(SyncDomain::Income, 2, vec!["A".into(), "B".into()]);
        assert_eq!(job.status, BatchStatus::Pending);
        assert!(!job.status.is_terminal());
        assert_eq!(job.len(), 2);
        assert_eq!(job.attempt_count, 0);
    }
}
