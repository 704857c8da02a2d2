//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no authorization — pure SQL. Queries are
//! runtime-bound so the crate compiles without a live database.

pub mod definitions;
pub mod events;
pub mod instances;
pub mod rules;
