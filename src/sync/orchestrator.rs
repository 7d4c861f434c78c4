//! Top-level synchronization coordinator
//!
//! Per domain: `PLANNING -> RESOLVING_UNIVERSE -> SCHEDULING -> PERSISTING -> COMMITTING -> DONE`,
//! or `DEGRADED` when a batch came back short. Partial-commit domains still
//! advance the watermark when degraded; atomic domains never do.

use chrono::NaiveDate;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::backoff::{BackoffPolicy, ExponentialBackoff};
use super::planner::IncrementalWindowPlanner;
use super::scheduler::BatchScheduler;
use super::universe::UniverseResolver;
use super::writer::UpsertWriter;
use crate::config::SyncConfig;
use crate::database::repositories::SyncStateRepository;
use crate::error::{PersistenceError, SyncError};
use crate::models::{CommitPolicy, DomainOutcome, DomainReport, RunReport, SyncDomain, SyncPhase};
use crate::provider::RateLimitedFetchClient;

pub struct SyncOrchestrator {
    planner: IncrementalWindowPlanner,
    resolver: Arc<UniverseResolver>,
    client: RateLimitedFetchClient,
    writer: Arc<UpsertWriter>,
    state: Arc<dyn SyncStateRepository>,
    backoff: Option<Arc<dyn BackoffPolicy>>,
    run_guard: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        planner: IncrementalWindowPlanner,
        resolver: Arc<UniverseResolver>,
        client: RateLimitedFetchClient,
        writer: Arc<UpsertWriter>,
        state: Arc<dyn SyncStateRepository>,
    ) -> Self {
        Self {
            planner,
            resolver,
            client,
            writer,
            state,
            backoff: None,
            run_guard: Mutex::new(()),
        }
    }

    /// Use `backoff` instead of the one described by each run's configuration
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Synchronize every domain in `config`
    ///
    /// Only preflight problems are returned as errors: an overlapping run, an
    /// invalid configuration, an empty static universe, or an unreachable state
    /// store. Everything that happens once domains start lands in the report.
    pub async fn run(
        &self,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| SyncError::RunInProgress)?;

        config.validate()?;
        self.resolver
            .check_static_lists(config.domains.iter().filter_map(|d| d.universe_kind()))?;
        self.with_state(|state| state.ping()).await?;

        let mut report = RunReport::new(Uuid::new_v4());
        let owner = report.run_id.to_string();

        let backoff = self
            .backoff
            .clone()
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::from(&config.backoff)));
        let scheduler = BatchScheduler::new(self.client.clone(), backoff);

        tracing::info!(
            "🚀 Sync run {} started: {} domains ({:?}, parallel: {})",
            report.run_id,
            config.domains.len(),
            config.mode,
            config.parallel_domains
        );

        if config.parallel_domains {
            let runs = config
                .domains
                .iter()
                .map(|domain| self.run_domain(*domain, config, &scheduler, &owner, &cancel));
            report.domains = join_all(runs).await;
        } else {
            for domain in &config.domains {
                let domain_report = self
                    .run_domain(*domain, config, &scheduler, &owner, &cancel)
                    .await;
                report.domains.push(domain_report);
            }
        }

        report.cancelled = cancel.is_cancelled();
        report.finished_at = Some(chrono::Utc::now());

        tracing::info!(
            "✅ Sync run {} finished: {} rows written (clean: {})",
            report.run_id,
            report.total_rows_written(),
            report.is_clean()
        );
        for domain in &report.domains {
            tracing::info!(
                "   {}: {:?} ({} batches, {} failed tickers, watermark {:?} -> {:?})",
                domain.domain,
                domain.outcome,
                domain.batches_attempted,
                domain.failed_tickers.len(),
                domain.watermark_before,
                domain.watermark_after
            );
        }

        Ok(report)
    }

    async fn run_domain(
        &self,
        domain: SyncDomain,
        config: &SyncConfig,
        scheduler: &BatchScheduler,
        owner: &str,
        cancel: &CancellationToken,
    ) -> DomainReport {
        let mut report = DomainReport::new(domain);

        if cancel.is_cancelled() {
            report.outcome = DomainOutcome::Cancelled;
            return report;
        }

        let Some(stale_after) = config.run_lock_timeout() else {
            return report.fail(format!(
                "run lock timeout of {}s is out of range",
                config.run_lock_timeout_secs
            ));
        };
        let run_owner = owner.to_string();
        match self
            .with_state(move |state| state.try_acquire_run(domain, &run_owner, stale_after))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("⚠️  {} is being synchronized by another run; skipping", domain);
                report.outcome = DomainOutcome::Skipped;
                return report;
            }
            Err(e) => {
                tracing::error!("❌ Failed to take run marker for {}: {}", domain, e);
                return report.fail(e);
            }
        }

        let report = self
            .sync_domain(report, domain, config, scheduler, owner, cancel)
            .await;

        let run_owner = owner.to_string();
        if let Err(e) = self
            .with_state(move |state| state.release_run(domain, &run_owner))
            .await
        {
            tracing::error!("Failed to release run marker for {}: {}", domain, e);
        }

        report
    }

    async fn sync_domain(
        &self,
        mut report: DomainReport,
        domain: SyncDomain,
        config: &SyncConfig,
        scheduler: &BatchScheduler,
        owner: &str,
        cancel: &CancellationToken,
    ) -> DomainReport {
        let settings = config.settings_for(domain);

        report.enter(SyncPhase::Planning);
        let watermark = match self.with_state(move |state| state.load_watermark(domain)).await {
            Ok(watermark) => watermark,
            Err(e) => {
                tracing::error!("❌ Failed to load watermark for {}: {}", domain, e);
                return report.fail(e);
            }
        };
        report.watermark_before = watermark;
        report.watermark_after = watermark;

        let window = self.planner.plan(domain, watermark, config.mode, &settings);
        report.window = Some(window);

        report.enter(SyncPhase::ResolvingUniverse);
        let universe = match self.resolver.resolve(domain).await {
            Ok(universe) => universe,
            Err(e) => {
                tracing::error!("❌ Failed to resolve universe for {}: {}", domain, e);
                return report.fail(e);
            }
        };
        report.universe_source = Some(universe.source);
        report.universe_size = universe.len();

        tracing::info!(
            "Syncing {} over {} ({} tickers from {:?})",
            domain,
            window.range,
            universe.len(),
            universe.source
        );

        report.enter(SyncPhase::Scheduling);
        let outcome = scheduler
            .run(&universe, &window, &settings, self.writer.as_ref(), cancel)
            .await;

        report.enter(SyncPhase::Persisting);
        report.absorb_batches(&outcome.jobs);

        if outcome.cancelled {
            tracing::info!("🛑 {} cancelled; watermark left at {:?}", domain, watermark);
            report.outcome = DomainOutcome::Cancelled;
            return report;
        }

        if outcome.permission_denied {
            report.enter(SyncPhase::Degraded);
            report.outcome = DomainOutcome::Degraded;
            report.error = Some(format!(
                "permission denied for {}; watermark not advanced",
                domain.api_name()
            ));
            return report;
        }

        if report.has_incomplete_batches() {
            report.enter(SyncPhase::Degraded);
            report.outcome = DomainOutcome::Degraded;

            let covered = report.batches_succeeded + report.batches_partial > 0;
            if report.batches_write_failed > 0 {
                tracing::warn!(
                    "⚠️  {} degraded with {} unpersisted batches; watermark withheld at {:?}",
                    domain,
                    report.batches_write_failed,
                    watermark
                );
                return report;
            }
            match domain.commit_policy() {
                CommitPolicy::Partial if covered => {
                    report.enter(SyncPhase::Committing);
                    if let Err(e) = self.commit(&mut report, domain, window.end_date(), owner).await {
                        report.error = Some(e.to_string());
                    }
                }
                _ => tracing::warn!(
                    "⚠️  {} degraded; watermark withheld at {:?}",
                    domain,
                    watermark
                ),
            }
            return report;
        }

        report.enter(SyncPhase::Committing);
        match self.commit(&mut report, domain, window.end_date(), owner).await {
            Ok(()) => {
                report.enter(SyncPhase::Done);
                report.outcome = DomainOutcome::Done;
                report
            }
            Err(e) => report.fail(e),
        }
    }

    async fn commit(
        &self,
        report: &mut DomainReport,
        domain: SyncDomain,
        date: NaiveDate,
        owner: &str,
    ) -> Result<(), PersistenceError> {
        let run_owner = owner.to_string();
        match self
            .with_state(move |state| state.commit_watermark(domain, date, &run_owner))
            .await
        {
            Ok(watermark) => {
                tracing::info!("Committed {} watermark {}", domain, watermark);
                report.watermark_after = Some(watermark);
                report.committed = true;
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ Failed to commit {} watermark: {}", domain, e);
                Err(e)
            }
        }
    }

    async fn with_state<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&dyn SyncStateRepository) -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || f(state.as_ref()))
            .await
            .map_err(|e| PersistenceError::TaskError(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DomainOverride, RateLimitConfig};
    use crate::error::{ConfigError, FetchError};
    use crate::models::{UniverseKind, UniverseSource};
    use crate::provider::{FetchParams, RateLimiter, RawRecord};
    use crate::sync::backoff::NoDelayBackoff;
    use crate::models::MAJOR_INDEXES;
    use crate::testing::{
        bar_row, income_row, listing_row, member_row, weight_row, FixedUniverseListing,
        InMemoryCacheStore, InMemoryMarketDataRepository, InMemorySyncStateRepository,
        ScriptedUpstream,
    };
    use chrono::Utc;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 6, 14)
    }

    struct Harness {
        orchestrator: SyncOrchestrator,
        upstream: Arc<ScriptedUpstream>,
        data: Arc<InMemoryMarketDataRepository>,
        state: Arc<InMemorySyncStateRepository>,
    }

    /// Upstream answering every domain with one row per requested code
    fn healthy(api: &str, params: &FetchParams) -> Result<Vec<RawRecord>, FetchError> {
        let codes = params.ts_code.clone().unwrap_or_default();
        Ok(codes
            .split(',')
            .map(|code| match api {
                "income" | "cashflow" | "dividend" => income_row(code, "20240331"),
                "ths_member" => member_row(code, "600000.SH"),
                _ => bar_row(code, "20240612"),
            })
            .collect())
    }

    fn harness_with<F>(
        codes: &[&str],
        state: InMemorySyncStateRepository,
        resolver: impl FnOnce(UniverseResolver) -> UniverseResolver,
        handler: F,
    ) -> Harness
    where
        F: Fn(&str, &FetchParams) -> Result<Vec<RawRecord>, FetchError> + Send + Sync + 'static,
    {
        let upstream = Arc::new(ScriptedUpstream::new(handler));
        let limiter = Arc::new(RateLimiter::new(&RateLimitConfig {
            min_interval_ms: 0,
            calls_per_cycle: 0,
            cooldown_ms: 0,
            max_concurrency: 4,
        }));
        let client = RateLimitedFetchClient::new(upstream.clone(), limiter);
        let resolver = resolver(UniverseResolver::new(
            Arc::new(FixedUniverseListing::with_codes(codes)),
            Arc::new(InMemoryCacheStore::new()),
        ));
        let data = Arc::new(InMemoryMarketDataRepository::new());
        let state = Arc::new(state);

        let orchestrator = SyncOrchestrator::new(
            IncrementalWindowPlanner::fixed(today()),
            Arc::new(resolver),
            client,
            Arc::new(UpsertWriter::new(data.clone(), 500)),
            state.clone(),
        )
        .with_backoff(Arc::new(NoDelayBackoff::new(2)));

        Harness {
            orchestrator,
            upstream,
            data,
            state,
        }
    }

    fn harness<F>(codes: &[&str], state: InMemorySyncStateRepository, handler: F) -> Harness
    where
        F: Fn(&str, &FetchParams) -> Result<Vec<RawRecord>, FetchError> + Send + Sync + 'static,
    {
        harness_with(codes, state, |r| r, handler)
    }

    fn config(domains: &[SyncDomain], batch_size: usize) -> SyncConfig {
        let mut config = SyncConfig {
            domains: domains.to_vec(),
            batch_size: Some(batch_size),
            ..SyncConfig::default()
        };
        for domain in domains {
            config.domain_overrides.insert(
                *domain,
                DomainOverride {
                    inter_batch_delay_ms: Some(0),
                    ..DomainOverride::default()
                },
            );
        }
        config
    }

    #[tokio::test]
    async fn test_failed_ticker_degrades_but_commits_price_domain() {
        let state = InMemorySyncStateRepository::new()
            .with_watermark(SyncDomain::WeeklyPrice, date(2024, 6, 10));
        let h = harness(&["A", "X", "B", "C"], state, |api, params| {
            if params.ts_code.as_deref() == Some("X") {
                return Err(FetchError::Transient("timeout".to_string()));
            }
            healthy(api, params)
        });

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::WeeklyPrice], 2), CancellationToken::new())
            .await
            .unwrap();

        let weekly = report.domain(SyncDomain::WeeklyPrice).unwrap();
        let window = weekly.window.unwrap();
        assert_eq!(window.start_date(), date(2024, 6, 5));
        assert_eq!(window.end_date(), today());

        assert_eq!(weekly.outcome, DomainOutcome::Degraded);
        assert_eq!(weekly.batches_partial, 1);
        assert_eq!(weekly.batches_succeeded, 1);
        assert!(weekly.committed);
        assert_eq!(weekly.watermark_after, Some(today()));
        assert_eq!(h.state.watermark(SyncDomain::WeeklyPrice), Some(today()));
        assert_eq!(weekly.failed_tickers.len(), 1);
        assert_eq!(weekly.failed_tickers[0].ticker, "X");
        assert!(weekly.phases.contains(&SyncPhase::Degraded));
        assert_eq!(h.data.records(SyncDomain::WeeklyPrice).len(), 3);
    }

    #[tokio::test]
    async fn test_atomic_domain_withholds_commit_when_degraded() {
        let state = InMemorySyncStateRepository::new()
            .with_watermark(SyncDomain::Income, date(2024, 3, 31));
        let h = harness(&["A", "X"], state, |api, params| {
            if params.ts_code.as_deref() == Some("X") {
                return Err(FetchError::Transient("timeout".to_string()));
            }
            healthy(api, params)
        });

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::Income], 10), CancellationToken::new())
            .await
            .unwrap();

        let income = report.domain(SyncDomain::Income).unwrap();
        assert_eq!(income.outcome, DomainOutcome::Degraded);
        assert!(!income.committed);
        assert_eq!(income.watermark_after, Some(date(2024, 3, 31)));
        assert_eq!(h.state.watermark(SyncDomain::Income), Some(date(2024, 3, 31)));
        // Rows that made it stay stored; only the watermark is withheld
        assert_eq!(h.data.records(SyncDomain::Income).len(), 1);
    }

    #[tokio::test]
    async fn test_clean_run_commits_and_releases_markers() {
        let h = harness(&["600000.SH", "600036.SH"], InMemorySyncStateRepository::new(), healthy);

        let report = h
            .orchestrator
            .run(
                &config(&[SyncDomain::DailyPrice, SyncDomain::Cashflow], 50),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.is_clean());
        assert!(report.finished_at.is_some());
        for domain in [SyncDomain::DailyPrice, SyncDomain::Cashflow] {
            let r = report.domain(domain).unwrap();
            assert_eq!(r.outcome, DomainOutcome::Done);
            assert_eq!(
                r.phases,
                vec![
                    SyncPhase::Planning,
                    SyncPhase::ResolvingUniverse,
                    SyncPhase::Scheduling,
                    SyncPhase::Persisting,
                    SyncPhase::Committing,
                    SyncPhase::Done,
                ]
            );
            assert_eq!(r.universe_source, Some(UniverseSource::Live));
            assert_eq!(h.state.watermark(domain), Some(today()));
            assert_eq!(h.state.marker(domain), None);
        }
        // First run falls back to the initial lookback
        let daily = report.domain(SyncDomain::DailyPrice).unwrap();
        assert_eq!(daily.window.unwrap().start_date(), date(2023, 6, 14));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let h = harness(&["A", "B", "C"], InMemorySyncStateRepository::new(), healthy);
        let cfg = config(&[SyncDomain::IndexDaily, SyncDomain::SectorMember], 2);

        h.orchestrator.run(&cfg, CancellationToken::new()).await.unwrap();
        let index_rows = h.data.records(SyncDomain::IndexDaily);
        let member_rows = h.data.records(SyncDomain::SectorMember);

        h.orchestrator.run(&cfg, CancellationToken::new()).await.unwrap();

        assert_eq!(h.data.records(SyncDomain::IndexDaily), index_rows);
        assert_eq!(h.data.records(SyncDomain::SectorMember), member_rows);
        assert_eq!(index_rows.len(), 3);
        assert_eq!(member_rows.len(), 3);
    }

    #[tokio::test]
    async fn test_permission_error_isolated_to_domain() {
        let h = harness(&["A", "B"], InMemorySyncStateRepository::new(), |api, params| {
            if api == "dividend" {
                return Err(FetchError::Permission {
                    api: api.to_string(),
                    message: "insufficient points".to_string(),
                });
            }
            healthy(api, params)
        });

        let report = h
            .orchestrator
            .run(
                &config(&[SyncDomain::Dividend, SyncDomain::WeeklyPrice], 1),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let dividend = report.domain(SyncDomain::Dividend).unwrap();
        assert_eq!(dividend.outcome, DomainOutcome::Degraded);
        assert_eq!(dividend.batches_attempted, 1);
        assert!(!dividend.committed);
        assert!(dividend.error.as_deref().unwrap().contains("permission"));
        assert_eq!(h.state.watermark(SyncDomain::Dividend), None);

        let weekly = report.domain(SyncDomain::WeeklyPrice).unwrap();
        assert_eq!(weekly.outcome, DomainOutcome::Done);
        assert!(weekly.committed);
    }

    #[tokio::test]
    async fn test_bad_ticker_in_slice_call_only_fails_itself() {
        let h = harness(&["A", "X", "B", "C"], InMemorySyncStateRepository::new(), |api, params| {
            let codes = params.ts_code.clone().unwrap_or_default();
            if codes.split(',').any(|c| c == "X") {
                return Err(FetchError::Transient("reset".to_string()));
            }
            healthy(api, params)
        });

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::DailyPrice], 2), CancellationToken::new())
            .await
            .unwrap();

        let daily = report.domain(SyncDomain::DailyPrice).unwrap();
        assert_eq!(daily.outcome, DomainOutcome::Degraded);
        assert_eq!(daily.batches_partial, 1);
        assert_eq!(daily.batches_succeeded, 1);
        assert_eq!(daily.batches_failed, 0);
        let failed: Vec<&str> = daily.failed_tickers.iter().map(|f| f.ticker.as_str()).collect();
        assert_eq!(failed, vec!["X"]);
        assert!(daily.committed);
        assert_eq!(h.state.watermark(SyncDomain::DailyPrice), Some(today()));
        assert_eq!(h.data.records(SyncDomain::DailyPrice).len(), 3);

        // The second slice needs no fallback
        assert_eq!(h.upstream.calls_for("B,C"), 1);
        assert_eq!(h.upstream.calls_for("B"), 0);
    }

    #[tokio::test]
    async fn test_single_ticker_slice_failure_fails_batch() {
        let h = harness(&["A", "X", "B"], InMemorySyncStateRepository::new(), |api, params| {
            if params.ts_code.as_deref() == Some("X") {
                return Err(FetchError::Transient("reset".to_string()));
            }
            healthy(api, params)
        });

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::DailyPrice], 1), CancellationToken::new())
            .await
            .unwrap();

        let daily = report.domain(SyncDomain::DailyPrice).unwrap();
        assert_eq!(daily.outcome, DomainOutcome::Degraded);
        assert_eq!(daily.batches_failed, 1);
        assert_eq!(daily.batches_succeeded, 2);
        assert!(daily.committed);
    }

    #[tokio::test]
    async fn test_unpersisted_batch_withholds_commit_on_partial_domain() {
        let h = harness(&["A", "B"], InMemorySyncStateRepository::new(), healthy);
        // Both attempts of the first batch hit a failing database
        h.data.fail_next_writes(2);

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::WeeklyPrice], 1), CancellationToken::new())
            .await
            .unwrap();

        let weekly = report.domain(SyncDomain::WeeklyPrice).unwrap();
        assert_eq!(weekly.outcome, DomainOutcome::Degraded);
        assert_eq!(weekly.batches_failed, 1);
        assert_eq!(weekly.batches_succeeded, 1);
        assert_eq!(weekly.batches_write_failed, 1);
        assert!(weekly.failed_tickers[0].reason.contains("persistence"));
        assert!(!weekly.committed);
        assert_eq!(weekly.watermark_after, None);
        assert_eq!(h.state.watermark(SyncDomain::WeeklyPrice), None);
        // The rows of the healthy batch stay stored
        assert_eq!(h.data.records(SyncDomain::WeeklyPrice).len(), 1);
    }

    /// Weights for every major index; one sector listing per index type unless `failing_type`
    fn fixed_query_upstream(
        failing_type: Option<&'static str>,
    ) -> impl Fn(&str, &FetchParams) -> Result<Vec<RawRecord>, FetchError> + Send + Sync + 'static
    {
        move |api, params| {
            let value = |key: &str| params.extra.get(key).cloned().unwrap_or_default();
            match api {
                "index_weight" => Ok(vec![
                    weight_row(&value("index_code"), "600519.SH", "20240603"),
                    weight_row(&value("index_code"), "601318.SH", "20240603"),
                ]),
                "ths_index" if failing_type == Some(value("type").as_str()) => {
                    Err(FetchError::Transient("reset".to_string()))
                }
                "ths_index" => Ok(vec![listing_row(&format!("88{}001.TI", value("type")), "sector")]),
                _ => Ok(vec![]),
            }
        }
    }

    #[tokio::test]
    async fn test_fixed_query_domains_sync_from_built_in_sets() {
        let h = harness(&["A"], InMemorySyncStateRepository::new(), fixed_query_upstream(None));

        let report = h
            .orchestrator
            .run(
                &config(&[SyncDomain::SectorIndex, SyncDomain::IndexWeight], 10),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.is_clean());
        for domain in [SyncDomain::SectorIndex, SyncDomain::IndexWeight] {
            let r = report.domain(domain).unwrap();
            assert_eq!(r.universe_source, Some(UniverseSource::Static));
            assert!(r.committed);
            assert_eq!(h.state.watermark(domain), Some(today()));
        }
        assert_eq!(
            report.domain(SyncDomain::IndexWeight).unwrap().universe_size,
            MAJOR_INDEXES.len()
        );
        assert_eq!(
            h.data.records(SyncDomain::IndexWeight).len(),
            2 * MAJOR_INDEXES.len()
        );
        assert_eq!(h.data.records(SyncDomain::SectorIndex).len(), 2);

        let sector_calls: Vec<_> = h
            .upstream
            .calls()
            .into_iter()
            .filter(|c| c.api_name == "ths_index")
            .collect();
        assert_eq!(sector_calls.len(), 2);
        assert!(sector_calls
            .iter()
            .all(|c| c.params.extra.get("exchange").map(String::as_str) == Some("A")));
    }

    #[tokio::test]
    async fn test_reference_domain_withholds_commit_when_segment_fails() {
        let h = harness(&["A"], InMemorySyncStateRepository::new(), fixed_query_upstream(Some("I")));

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::SectorIndex], 10), CancellationToken::new())
            .await
            .unwrap();

        let sectors = report.domain(SyncDomain::SectorIndex).unwrap();
        assert_eq!(sectors.outcome, DomainOutcome::Degraded);
        assert_eq!(sectors.batches_partial, 1);
        assert!(!sectors.committed);
        assert_eq!(h.state.watermark(SyncDomain::SectorIndex), None);
        assert_eq!(h.data.records(SyncDomain::SectorIndex).len(), 1);
    }

    #[tokio::test]
    async fn test_marker_held_elsewhere_skips_domain() {
        let state = InMemorySyncStateRepository::new().with_marker(
            SyncDomain::EtfDaily,
            "other-run",
            Utc::now(),
        );
        let h = harness(&["510300.SH"], state, healthy);

        let report = h
            .orchestrator
            .run(
                &config(&[SyncDomain::EtfDaily, SyncDomain::IndexDaily], 10),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            report.domain(SyncDomain::EtfDaily).unwrap().outcome,
            DomainOutcome::Skipped
        );
        assert_eq!(h.state.marker(SyncDomain::EtfDaily).as_deref(), Some("other-run"));
        assert_eq!(
            report.domain(SyncDomain::IndexDaily).unwrap().outcome,
            DomainOutcome::Done
        );
    }

    #[tokio::test]
    async fn test_stale_marker_is_taken_over() {
        let state = InMemorySyncStateRepository::new().with_marker(
            SyncDomain::EtfDaily,
            "crashed-run",
            Utc::now() - chrono::Duration::hours(7),
        );
        let h = harness(&["510300.SH"], state, healthy);

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::EtfDaily], 10), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.domain(SyncDomain::EtfDaily).unwrap().outcome,
            DomainOutcome::Done
        );
        assert_eq!(h.state.marker(SyncDomain::EtfDaily), None);
    }

    #[tokio::test]
    async fn test_empty_static_universe_aborts_before_any_domain() {
        let h = harness_with(
            &["A"],
            InMemorySyncStateRepository::new(),
            |r| r.with_static_list(UniverseKind::Sector, vec![]),
            healthy,
        );

        let err = h
            .orchestrator
            .run(
                &config(&[SyncDomain::WeeklyPrice, SyncDomain::SectorDaily], 10),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::Config(ConfigError::EmptyStaticUniverse(UniverseKind::Sector))
        ));
        assert!(h.upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_database_is_fatal() {
        let state = InMemorySyncStateRepository::new().unreachable("connection refused");
        let h = harness(&["A"], state, healthy);

        let err = h
            .orchestrator
            .run(&config(&[SyncDomain::WeeklyPrice], 10), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Persistence(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let h = harness(&["A"], InMemorySyncStateRepository::new(), healthy);

        let err = h
            .orchestrator
            .run(&config(&[SyncDomain::WeeklyPrice], 0), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Config(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let state = InMemorySyncStateRepository::new().with_slow_ping(Duration::from_millis(200));
        let h = harness(&["A"], state, healthy);
        let cfg = config(&[SyncDomain::WeeklyPrice], 10);

        let (first, second) = tokio::join!(
            h.orchestrator.run(&cfg, CancellationToken::new()),
            async {
                tokio::task::yield_now().await;
                let running = h.orchestrator.is_running();
                (running, h.orchestrator.run(&cfg, CancellationToken::new()).await)
            }
        );

        assert!(first.is_ok());
        assert!(second.0);
        assert!(matches!(second.1, Err(SyncError::RunInProgress)));
        assert!(!h.orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_run_commits_nothing() {
        let h = harness(&["A", "B"], InMemorySyncStateRepository::new(), healthy);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::WeeklyPrice, SyncDomain::Income], 1), cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report
            .domains
            .iter()
            .all(|d| d.outcome == DomainOutcome::Cancelled && !d.committed));
        assert!(h.upstream.calls().is_empty());
        assert_eq!(h.state.watermark(SyncDomain::WeeklyPrice), None);
    }

    #[tokio::test]
    async fn test_cancel_mid_domain_keeps_written_rows_but_not_watermark() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let h = harness(&["A", "B", "C"], InMemorySyncStateRepository::new(), move |api, params| {
            trigger.cancel();
            healthy(api, params)
        });

        let report = h
            .orchestrator
            .run(&config(&[SyncDomain::SectorDaily], 1), cancel)
            .await
            .unwrap();

        let sector = report.domain(SyncDomain::SectorDaily).unwrap();
        assert_eq!(sector.outcome, DomainOutcome::Cancelled);
        assert_eq!(sector.batches_attempted, 1);
        assert_eq!(h.data.records(SyncDomain::SectorDaily).len(), 1);
        assert_eq!(h.state.watermark(SyncDomain::SectorDaily), None);
        assert_eq!(h.state.marker(SyncDomain::SectorDaily), None);
    }

    #[tokio::test]
    async fn test_parallel_domains_run_independently() {
        let h = harness(&["A", "B"], InMemorySyncStateRepository::new(), healthy);
        let mut cfg = config(
            &[SyncDomain::WeeklyPrice, SyncDomain::IndexDaily, SyncDomain::Cashflow],
            1,
        );
        cfg.parallel_domains = true;

        let report = h.orchestrator.run(&cfg, CancellationToken::new()).await.unwrap();

        assert_eq!(report.domains.len(), 3);
        assert_eq!(report.domains[0].domain, SyncDomain::WeeklyPrice);
        assert!(report.is_clean());
        assert_eq!(report.total_rows_written(), 6);
    }

    #[tokio::test]
    async fn test_backfill_ignores_watermark() {
        let state = InMemorySyncStateRepository::new()
            .with_watermark(SyncDomain::WeeklyPrice, date(2024, 6, 10));
        let h = harness(&["A"], state, healthy);
        let mut cfg = config(&[SyncDomain::WeeklyPrice], 10);
        cfg.mode = crate::models::SyncMode::Backfill;

        let report = h.orchestrator.run(&cfg, CancellationToken::new()).await.unwrap();

        let weekly = report.domain(SyncDomain::WeeklyPrice).unwrap();
        assert_eq!(weekly.window.unwrap().start_date(), date(2021, 6, 14));
        assert_eq!(h.upstream.calls()[0].params.start_date, Some(date(2021, 6, 14)));
        assert!(weekly.committed);
    }
}
