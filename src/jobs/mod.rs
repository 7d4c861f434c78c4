/// Cron jobs and scheduled tasks module
///
/// Contains background jobs that run on a schedule:
/// - Market data synchronization (cron, startup, or API trigger)

pub mod sync_job;

pub use sync_job::{RunRequest, SyncJob};
