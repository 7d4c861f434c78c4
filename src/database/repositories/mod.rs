/// Repository pattern implementations
///
/// - **MarketDataRepository**: natural-key upserts into the per-domain tables
/// - **SyncStateRepository**: watermarks and run-in-progress markers
///
/// Both are synchronous; async callers go through `spawn_blocking`.

pub mod market_data_repository;
pub mod sync_state_repository;

pub use market_data_repository::{MarketDataRepository, MarketDataRepositoryImpl};
pub use sync_state_repository::{SyncStateRepository, SyncStateRepositoryImpl};
