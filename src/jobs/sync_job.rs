use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::{RunReport, SyncDomain, SyncMode};
use crate::sync::SyncOrchestrator;

/// Optional narrowing of a triggered run
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RunRequest {
    /// Domains to synchronize (default: all configured)
    #[serde(default)]
    pub domains: Option<Vec<SyncDomain>>,
    /// Planning mode (default: configured mode)
    #[serde(default)]
    pub mode: Option<SyncMode>,
}

/// Market data synchronization job
///
/// Owns the base configuration, the stop signal of the active run, and the
/// last run report. Triggered by cron, at startup, or through the API.
pub struct SyncJob {
    orchestrator: Arc<SyncOrchestrator>,
    config: SyncConfig,
    active: Mutex<Option<CancellationToken>>,
    last_report: RwLock<Option<RunReport>>,
}

impl SyncJob {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, config: SyncConfig) -> Self {
        Self {
            orchestrator,
            config,
            active: Mutex::new(None),
            last_report: RwLock::new(None),
        }
    }

    /// Claim the job for one run and hand out its stop signal
    fn reserve(&self) -> Result<CancellationToken, SyncError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(SyncError::RunInProgress);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(token)
    }

    async fn execute(
        &self,
        request: Option<RunRequest>,
        cancel: CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let request = request.unwrap_or_default();
        let config = self.config.scoped(request.domains, request.mode);

        let result = self.orchestrator.run(&config, cancel).await;

        match &result {
            Ok(report) => *self.last_report.write() = Some(report.clone()),
            Err(e) => tracing::error!("❌ Sync run aborted: {}", e),
        }
        // Idle only once the report is readable
        *self.active.lock() = None;
        result
    }

    /// Run synchronously and return the report
    pub async fn run_now(&self, request: Option<RunRequest>) -> Result<RunReport, SyncError> {
        let cancel = self.reserve()?;
        self.execute(request, cancel).await
    }

    /// Start a run in the background
    ///
    /// Fails immediately with `RunInProgress` if a run is already active.
    pub fn spawn_run(self: &Arc<Self>, request: Option<RunRequest>) -> Result<(), SyncError> {
        let cancel = self.reserve()?;
        let job = self.clone();

        tokio::spawn(async move {
            let _ = job.execute(request, cancel).await;
        });

        Ok(())
    }

    /// Raise the stop signal of the active run; false when idle
    ///
    /// The run halts before its next batch.
    pub fn stop(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(token) => {
                tracing::info!("🛑 Stop requested for the active sync run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some() || self.orchestrator.is_running()
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().clone()
    }

    /// Register this job with the scheduler
    pub async fn register(
        self: &Arc<Self>,
        scheduler: &JobScheduler,
        cron: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let sync_job = self.clone();

        let job = Job::new_async(cron, move |_uuid, _lock| {
            let sync_job = sync_job.clone();

            Box::pin(async move {
                match sync_job.run_now(None).await {
                    Ok(report) => tracing::info!(
                        "Scheduled sync run {} completed ({} rows)",
                        report.run_id,
                        report.total_rows_written()
                    ),
                    Err(SyncError::RunInProgress) => {
                        tracing::warn!("Scheduled sync skipped: a run is already in progress")
                    }
                    Err(e) => tracing::error!("Scheduled sync run failed: {}", e),
                }
            })
        })?;

        scheduler.add(job).await?;

        tracing::info!("Sync job registered (cron: {})", cron);

        Ok(())
    }
}
