//! The `EventLog` trait and its in-memory implementation.
//!
//! Appends assign a process-wide monotonic sequence number; reads per
//! instance come back in that order, which is the total order the rest of
//! the system relies on.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{DomainEvent, EventLogError};

/// Append-only event storage.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event and return its assigned sequence number.
    async fn append(&self, event: DomainEvent) -> Result<i64, EventLogError>;

    /// All events for one instance, ordered by sequence number.
    async fn list_by_instance(&self, instance_id: Uuid) -> Result<Vec<DomainEvent>, EventLogError>;
}

/// In-memory event log backed by a `Vec`.
///
/// Used by the state-machine tests and anywhere a database is overkill.
#[derive(Default)]
pub struct MemoryEventLog {
    entries: Mutex<Vec<DomainEvent>>,
    next_seq: AtomicI64,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_seq: AtomicI64::new(1),
        }
    }

    /// Snapshot of every appended event, in log order.
    pub fn all(&self) -> Vec<DomainEvent> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, mut event: DomainEvent) -> Result<i64, EventLogError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        event.seq = seq;
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| EventLogError::Storage(format!("event log lock poisoned: {e}")))?;
        entries.push(event);
        Ok(seq)
    }

    async fn list_by_instance(&self, instance_id: Uuid) -> Result<Vec<DomainEvent>, EventLogError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| EventLogError::Storage(format!("event log lock poisoned: {e}")))?;
        Ok(entries
            .iter()
            .filter(|e| e.instance_id == Some(instance_id))
            .cloned()
            .collect())
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;
    use serde_json::json;

    fn event(instance_id: Uuid, event_type: EventType) -> DomainEvent {
        DomainEvent::new(event_type, Some(instance_id), None, None, json!({}))
    }

    #[tokio::test]
    async fn append_assigns_monotonic_sequence() {
        let log = MemoryEventLog::new();
        let id = Uuid::new_v4();

        let s1 = log.append(event(id, EventType::InstanceStarted)).await.unwrap();
        let s2 = log.append(event(id, EventType::StepEntered)).await.unwrap();
        let s3 = log.append(event(id, EventType::StepCompleted)).await.unwrap();

        assert!(s1 < s2 && s2 < s3);
    }

    #[tokio::test]
    async fn list_by_instance_filters_and_preserves_order() {
        let log = MemoryEventLog::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        log.append(event(a, EventType::InstanceStarted)).await.unwrap();
        log.append(event(b, EventType::InstanceStarted)).await.unwrap();
        log.append(event(a, EventType::StepCompleted)).await.unwrap();

        let for_a = log.list_by_instance(a).await.unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].event_type, EventType::InstanceStarted);
        assert_eq!(for_a[1].event_type, EventType::StepCompleted);
        assert!(for_a[0].seq < for_a[1].seq);
    }
}
