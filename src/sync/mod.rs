//! The synchronization engine
//!
//! - **UniverseResolver**: ticker set per domain (live, cache, static)
//! - **IncrementalWindowPlanner**: date range still needing synchronization
//! - **BatchScheduler**: ordered, retried, rate-limited batches
//! - **UpsertWriter**: idempotent natural-key persistence
//! - **SyncOrchestrator**: per-domain state machine and watermark commits

pub mod backoff;
pub mod orchestrator;
pub mod planner;
pub mod scheduler;
pub mod universe;
pub mod writer;

pub use backoff::{BackoffPolicy, ExponentialBackoff, NoDelayBackoff};
pub use orchestrator::SyncOrchestrator;
pub use planner::IncrementalWindowPlanner;
pub use scheduler::{partition, BatchScheduler, ScheduleOutcome, SLICE_ROW_LIMIT};
pub use universe::{
    is_main_board, static_universe, CachedUniverse, FileCacheStore, ProviderUniverseListing,
    UniverseCacheStore, UniverseListing, UniverseResolver, UNIVERSE_CACHE_TTL_DAYS,
};
pub use writer::{BatchSink, UpsertWriter};
