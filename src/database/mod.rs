/// Database module for PostgreSQL integration
///
/// This module provides:
/// - Connection pooling (diesel + r2d2)
/// - Repository traits and their diesel implementations
/// - Database models and schema

pub mod connection;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{establish_connection_pool, DatabasePool, PersistenceError};
