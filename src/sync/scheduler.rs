//! Batch scheduling for one domain
//!
//! The universe is cut into fixed-size slices processed strictly in order. Inside
//! a slice, tickers are fetched with bounded concurrency; a failing ticker never
//! aborts its neighbours. A batch is retried as a whole, but tickers already
//! fetched or persisted on an earlier attempt are not fetched again.

use chrono::Days;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffPolicy;
use super::writer::BatchSink;
use crate::config::DomainSettings;
use crate::error::FetchError;
use crate::models::{
    BatchJob, BatchStatus, DateRange, FetchShape, Record, SyncDomain, SyncWindow, TickerFailure,
    UniverseSnapshot,
};
use crate::provider::{FetchParams, RateLimitedFetchClient, RawRecord};

/// Upstream row cap for one slice-native call
pub const SLICE_ROW_LIMIT: usize = 6000;

/// Result of scheduling one domain
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// Terminal batches, in processing order
    pub jobs: Vec<BatchJob>,
    /// The stop signal ended the domain before every batch ran
    pub cancelled: bool,
    /// The account lacks entitlement for the domain's API
    pub permission_denied: bool,
}

/// Split tickers into consecutive slices of at most `batch_size`, keeping order
pub fn partition(tickers: &[String], batch_size: usize) -> Vec<Vec<String>> {
    tickers
        .chunks(batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

type FetchResult = (String, Result<Vec<RawRecord>, FetchError>);

pub struct BatchScheduler {
    client: RateLimitedFetchClient,
    backoff: Arc<dyn BackoffPolicy>,
}

impl BatchScheduler {
    pub fn new(client: RateLimitedFetchClient, backoff: Arc<dyn BackoffPolicy>) -> Self {
        Self { client, backoff }
    }

    pub async fn run(
        &self,
        universe: &UniverseSnapshot,
        window: &SyncWindow,
        settings: &DomainSettings,
        sink: &dyn BatchSink,
        cancel: &CancellationToken,
    ) -> ScheduleOutcome {
        let domain = window.domain;
        let batches = partition(&universe.symbols(), settings.batch_size);
        let total = batches.len();
        let inter_batch_delay = Duration::from_millis(settings.inter_batch_delay_ms);
        let mut concurrency = settings
            .max_concurrency
            .clamp(1, self.client.limiter().max_concurrency());
        let mut outcome = ScheduleOutcome::default();

        tracing::info!(
            "Scheduling {} {} batches ({} tickers, batch size {})",
            total,
            domain,
            universe.len(),
            settings.batch_size
        );

        for (index, tickers) in batches.into_iter().enumerate() {
            if index > 0 && !inter_batch_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(inter_batch_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                tracing::info!(
                    "🛑 Stop requested; {} halted after {}/{} batches",
                    domain,
                    index,
                    total
                );
                outcome.cancelled = true;
                break;
            }

            let job = self
                .run_batch(domain, index, tickers, window, concurrency, sink)
                .await;

            tracing::info!(
                "{} batch {}/{}: {:?} ({} ok, {} failed, {} rows, {} attempts)",
                domain,
                index + 1,
                total,
                job.status,
                job.succeeded.len(),
                job.failed.len(),
                job.rows_written,
                job.attempt_count
            );

            if job.rate_limited && concurrency > 1 {
                concurrency = (concurrency / 2).max(1);
                tracing::warn!(
                    "Rate limited on {}; concurrency reduced to {}",
                    domain,
                    concurrency
                );
            }

            let denied = job.permission_denied;
            outcome.jobs.push(job);
            if denied {
                tracing::error!(
                    "❌ Permission denied for {} ({}); stopping domain",
                    domain,
                    domain.api_name()
                );
                outcome.permission_denied = true;
                break;
            }
        }

        outcome
    }

    async fn run_batch(
        &self,
        domain: SyncDomain,
        index: usize,
        tickers: Vec<String>,
        window: &SyncWindow,
        concurrency: usize,
        sink: &dyn BatchSink,
    ) -> BatchJob {
        let mut job = BatchJob::new(domain, index, tickers);
        job.status = BatchStatus::InProgress;

        let max_attempts = self.backoff.max_attempts().max(1);
        let mut pending: Vec<String> = job.tickers.clone();
        // Fetched but not yet persisted, by ticker
        let mut buffered: HashMap<String, Vec<Record>> = HashMap::new();
        let mut last_error: HashMap<String, String> = HashMap::new();

        while job.attempt_count < max_attempts && !pending.is_empty() {
            job.attempt_count += 1;

            let to_fetch: Vec<String> = pending
                .iter()
                .filter(|t| !buffered.contains_key(*t))
                .cloned()
                .collect();

            if !to_fetch.is_empty() {
                let results = self
                    .fetch(domain, &to_fetch, window, concurrency, &mut job.rate_limited)
                    .await;
                for (ticker, result) in results {
                    match result {
                        Ok(rows) => {
                            let records = convert(domain, rows, &mut job);
                            buffered.insert(ticker, records);
                        }
                        Err(FetchError::NotFound { .. }) => {
                            buffered.insert(ticker, Vec::new());
                        }
                        Err(e) => {
                            job.rate_limited |= e.is_rate_limited();
                            job.permission_denied |= e.is_permission();
                            last_error.insert(ticker, e.to_string());
                        }
                    }
                }
            }

            if job.permission_denied {
                break;
            }

            let ready: Vec<String> = pending
                .iter()
                .filter(|t| buffered.contains_key(*t))
                .cloned()
                .collect();

            if !ready.is_empty() {
                let records: Vec<Record> = ready
                    .iter()
                    .filter_map(|t| buffered.get(t))
                    .flatten()
                    .cloned()
                    .collect();

                let written = if records.is_empty() {
                    Ok(0)
                } else {
                    sink.write(domain, records).await
                };

                match written {
                    Ok(rows) => {
                        job.rows_written += rows;
                        let done: HashSet<&String> = ready.iter().collect();
                        pending.retain(|t| !done.contains(t));
                        for ticker in &ready {
                            buffered.remove(ticker);
                            last_error.remove(ticker);
                        }
                        job.succeeded.extend(ready);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "⚠️  Write failed for {} batch {} (attempt {}): {}",
                            domain,
                            index + 1,
                            job.attempt_count,
                            e
                        );
                        for ticker in ready {
                            last_error.insert(ticker, format!("persistence: {}", e));
                        }
                    }
                }
            }

            if !pending.is_empty() && job.attempt_count < max_attempts {
                let delay = self.backoff.delay_for(job.attempt_count);
                tracing::warn!(
                    "Retrying {} batch {} in {:?}: {} tickers pending after attempt {}",
                    domain,
                    index + 1,
                    delay,
                    pending.len(),
                    job.attempt_count
                );
                tokio::time::sleep(delay).await;
            }
        }

        // Fetched rows that never reached the database
        job.write_failed = pending.iter().any(|t| buffered.contains_key(t));
        job.failed = pending
            .into_iter()
            .map(|ticker| {
                let reason = last_error
                    .remove(&ticker)
                    .unwrap_or_else(|| "not attempted".to_string());
                TickerFailure { ticker, reason }
            })
            .collect();
        job.status = BatchStatus::from_counts(job.succeeded.len(), job.tickers.len());

        if job.status == BatchStatus::Failed {
            tracing::error!(
                "❌ {} batch {} failed after {} attempts",
                domain,
                index + 1,
                job.attempt_count
            );
        }

        job
    }

    async fn fetch(
        &self,
        domain: SyncDomain,
        tickers: &[String],
        window: &SyncWindow,
        concurrency: usize,
        rate_limited: &mut bool,
    ) -> Vec<FetchResult> {
        match domain.fetch_shape() {
            FetchShape::PerTicker => self.fetch_each(domain, tickers, window, concurrency).await,
            FetchShape::SliceNative => match self.fetch_slice(domain, tickers, window).await {
                Ok(results) => results,
                Err(e) if e.is_retryable() && tickers.len() > 1 => {
                    *rate_limited |= e.is_rate_limited();
                    tracing::warn!(
                        "⚠️  {} slice call failed ({}); falling back to {} per-ticker calls",
                        domain,
                        e,
                        tickers.len()
                    );
                    self.fetch_each(domain, tickers, window, concurrency).await
                }
                Err(e) => tickers.iter().map(|t| (t.clone(), Err(e.clone()))).collect(),
            },
        }
    }

    async fn fetch_each(
        &self,
        domain: SyncDomain,
        tickers: &[String],
        window: &SyncWindow,
        concurrency: usize,
    ) -> Vec<FetchResult> {
        stream::iter(tickers.iter().cloned())
            .map(|ticker| async move {
                let params = ticker_params(domain, &ticker, window);
                let result = self.client.fetch(domain, &params).await;
                (ticker, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// One call per sub-range for the whole slice, split back out by ticker
    ///
    /// A failed sub-range call fails the slice as a whole.
    async fn fetch_slice(
        &self,
        domain: SyncDomain,
        tickers: &[String],
        window: &SyncWindow,
    ) -> Result<Vec<FetchResult>, FetchError> {
        let mut rows: Vec<RawRecord> = Vec::new();

        for range in split_range(window.range, SLICE_ROW_LIMIT / tickers.len().max(1)) {
            let params = FetchParams::for_tickers(tickers).with_range(range);
            match self.client.fetch(domain, &params).await {
                Ok(batch) => rows.extend(batch),
                Err(FetchError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let mut by_ticker: HashMap<String, Vec<RawRecord>> = HashMap::new();
        for row in rows {
            match row.get_str("ts_code") {
                Some(code) => by_ticker.entry(code).or_default().push(row),
                None => tracing::warn!("⚠️  Dropping {} row without ts_code", domain),
            }
        }

        Ok(tickers
            .iter()
            .map(|ticker| {
                let result = match by_ticker.remove(ticker) {
                    Some(rows) => Ok(rows),
                    None => Err(FetchError::NotFound {
                        api: domain.api_name().to_string(),
                    }),
                };
                (ticker.clone(), result)
            })
            .collect())
    }
}

fn ticker_params(domain: SyncDomain, ticker: &str, window: &SyncWindow) -> FetchParams {
    let mut params = match domain.code_param() {
        "ts_code" => FetchParams::for_ticker(ticker),
        key => FetchParams::new().with(key, ticker),
    };
    for (key, value) in domain.fixed_params() {
        params = params.with(*key, *value);
    }
    if domain.is_windowed() {
        params.with_range(window.range)
    } else {
        params
    }
}

/// Cut `range` into consecutive pieces of at most `max_days` calendar days
fn split_range(range: DateRange, max_days: usize) -> Vec<DateRange> {
    let step = max_days.max(1) as u64;
    let mut pieces = Vec::new();
    let mut start = range.start;

    loop {
        let end = start
            .checked_add_days(Days::new(step - 1))
            .map_or(range.end, |d| d.min(range.end));
        pieces.push(DateRange::new(start, end));
        match end.checked_add_days(Days::new(1)) {
            Some(next) if end < range.end => start = next,
            _ => break,
        }
    }

    pieces
}

fn convert(domain: SyncDomain, rows: Vec<RawRecord>, job: &mut BatchJob) -> Vec<Record> {
    let mut records = Vec::with_capacity(rows.len());
    for raw in &rows {
        match Record::from_raw(domain, raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("⚠️  Rejected record: {}", e);
                job.rejected_records += 1;
            }
        }
    }
    records
}
