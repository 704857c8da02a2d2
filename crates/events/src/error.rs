//! Event-log error type.

use thiserror::Error;

/// The only way an append can fail is the backing store being unavailable.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event storage unavailable: {0}")]
    Storage(String),
}
