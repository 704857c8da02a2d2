//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table in the schema, and the Postgres-backed implementations of
//! the engine's storage traits. No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod stores;

pub use error::DbError;
pub use pool::DbPool;
pub use stores::{PgEventLog, PgInstanceStore, PgRuleStore};
