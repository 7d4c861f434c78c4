// Library Crate Root
// lib.rs

// pub mod xxx declares xxx module exists in the same crate
// main.rs imports through lib.rs like an external crate
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod models;
pub mod provider;
pub mod sync;
pub mod testing;

// pub use = re-export at crate root
pub use api::{create_router, AppState};
pub use config::{AppConfig, SyncConfig};
pub use error::{ConfigError, FetchError, PersistenceError, SyncError};
pub use jobs::{RunRequest, SyncJob};
pub use models::{DomainOutcome, DomainReport, RunReport, SyncDomain, SyncMode};
pub use sync::SyncOrchestrator;
