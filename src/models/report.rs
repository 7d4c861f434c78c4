use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::batch::{BatchJob, BatchStatus, TickerFailure};
use super::domain::SyncDomain;
use super::ticker::UniverseSource;
use super::window::SyncWindow;

/// Per-domain run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    Planning,
    ResolvingUniverse,
    Scheduling,
    Persisting,
    Committing,
    Done,
    Degraded,
}

/// How a domain run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DomainOutcome {
    /// Every batch succeeded and the watermark was committed
    Done,
    /// At least one batch was not SUCCESS, or the domain lacks entitlement
    Degraded,
    /// The domain could not run (planning, universe, or state store failure)
    Failed,
    /// Another run holds this domain's run marker
    Skipped,
    /// The stop signal arrived before the domain finished
    Cancelled,
}

/// Structured per-domain summary consumed by notification layers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainReport {
    pub domain: SyncDomain,
    pub outcome: DomainOutcome,
    /// Every state the domain passed through, in order
    pub phases: Vec<SyncPhase>,
    pub window: Option<SyncWindow>,
    pub universe_source: Option<UniverseSource>,
    pub universe_size: usize,
    pub batches_attempted: usize,
    pub batches_succeeded: usize,
    pub batches_partial: usize,
    pub batches_failed: usize,
    /// Batches left holding fetched rows the database never accepted
    pub batches_write_failed: usize,
    pub rows_written: usize,
    pub rejected_records: usize,
    pub failed_tickers: Vec<TickerFailure>,
    pub watermark_before: Option<NaiveDate>,
    pub watermark_after: Option<NaiveDate>,
    pub committed: bool,
    pub error: Option<String>,
}

impl DomainReport {
    pub fn new(domain: SyncDomain) -> Self {
        Self {
            domain,
            outcome: DomainOutcome::Done,
            phases: Vec::new(),
            window: None,
            universe_source: None,
            universe_size: 0,
            batches_attempted: 0,
            batches_succeeded: 0,
            batches_partial: 0,
            batches_failed: 0,
            batches_write_failed: 0,
            rows_written: 0,
            rejected_records: 0,
            failed_tickers: Vec::new(),
            watermark_before: None,
            watermark_after: None,
            committed: false,
            error: None,
        }
    }

    pub fn enter(&mut self, phase: SyncPhase) {
        self.phases.push(phase);
    }

    /// Fold terminal batch results into the counters
    pub fn absorb_batches(&mut self, jobs: &[BatchJob]) {
        for job in jobs {
            self.batches_attempted += 1;
            match job.status {
                BatchStatus::Success => self.batches_succeeded += 1,
                BatchStatus::Partial => self.batches_partial += 1,
                _ => self.batches_failed += 1,
            }
            if job.write_failed {
                self.batches_write_failed += 1;
            }
            self.rows_written += job.rows_written;
            self.rejected_records += job.rejected_records;
            self.failed_tickers.extend(job.failed.iter().cloned());
        }
    }

    /// True when any batch ended short of SUCCESS
    pub fn has_incomplete_batches(&self) -> bool {
        self.batches_partial > 0 || self.batches_failed > 0
    }

    pub fn fail(mut self, error: impl ToString) -> Self {
        self.outcome = DomainOutcome::Failed;
        self.error = Some(error.to_string());
        self
    }
}

/// Summary of one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub domains: Vec<DomainReport>,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            domains: Vec::new(),
        }
    }

    pub fn domain(&self, domain: SyncDomain) -> Option<&DomainReport> {
        self.domains.iter().find(|r| r.domain == domain)
    }

    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.domains.iter().all(|r| r.outcome == DomainOutcome::Done)
    }

    pub fn total_rows_written(&self) -> usize {
        self.domains.iter().map(|r| r.rows_written).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: BatchStatus, rows: usize, failed: &[&str]) -> BatchJob {
        let mut job = BatchJob::new(SyncDomain::DailyPrice, 0, vec![]);
        job.status = status;
        job.rows_written = rows;
        job.failed = failed
            .iter()
            .map(|t| TickerFailure {
                ticker: t.to_string(),
                reason: "timeout".to_string(),
            })
            .collect();
        job
    }

    #[test]
    fn test_absorb_batches_counts_statuses() {
        let mut report = DomainReport::new(SyncDomain::DailyPrice);
        report.absorb_batches(&[
            job(BatchStatus::Success, 10, &[]),
            job(BatchStatus::Partial, 4, &["X"]),
            job(BatchStatus::Failed, 0, &["Y", "Z"]),
        ]);

        assert_eq!(report.batches_attempted, 3);
        assert_eq!(report.batches_succeeded, 1);
        assert_eq!(report.batches_partial, 1);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.rows_written, 14);
        assert_eq!(report.failed_tickers.len(), 3);
        assert_eq!(report.batches_write_failed, 0);
        assert!(report.has_incomplete_batches());
    }

    #[test]
    fn test_absorb_batches_counts_unpersisted_batches() {
        let mut unpersisted = job(BatchStatus::Failed, 0, &["A"]);
        unpersisted.write_failed = true;

        let mut report = DomainReport::new(SyncDomain::WeeklyPrice);
        report.absorb_batches(&[unpersisted, job(BatchStatus::Success, 3, &[])]);

        assert_eq!(report.batches_write_failed, 1);
        assert_eq!(report.batches_succeeded, 1);
    }

    #[test]
    fn test_run_report_is_clean() {
        let mut run = RunReport::new(Uuid::new_v4());
        run.domains.push(DomainReport::new(SyncDomain::Income));
        assert!(run.is_clean());

        run.domains
            .push(DomainReport::new(SyncDomain::Cashflow).fail("pool exhausted"));
        assert!(!run.is_clean());
        assert_eq!(
            run.domain(SyncDomain::Cashflow).unwrap().error.as_deref(),
            Some("pool exhausted")
        );
    }
}
