//! In-memory collaborators
//!
//! Stand-ins for the upstream provider, the database, and the universe cache.
//! Used by the unit tests and by the API's dry-run wiring.

pub mod fixtures;
pub mod repositories;
pub mod universe;
pub mod upstream;

pub use fixtures::{quick_config, scripted_orchestrator};
pub use repositories::{InMemoryMarketDataRepository, InMemorySyncStateRepository};
pub use universe::{FixedUniverseListing, InMemoryCacheStore};
pub use upstream::{
    bar_row, income_row, listing_row, member_row, weight_row, RecordedCall, ScriptedUpstream,
};
