//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    /// The optimistic-concurrency guard of a transition matched no row.
    #[error("concurrent update conflict")]
    Conflict,

    /// A stored value no longer parses into its domain type.
    #[error("row decode error: {0}")]
    Decode(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
