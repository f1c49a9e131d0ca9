use std::collections::HashMap;
use std::sync::RwLock;

use umrahops_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batch};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Commit order across all streams.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock makes every batch atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&batch)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        // Check every stream before writing anything.
        for stream in &batch {
            let existing = inner.streams.get(&stream.aggregate_id).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(existing);
            if !stream.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    stream.aggregate_id, stream.expected_version
                )));
            }
            if let (Some(head), Some(incoming)) = (existing.first(), stream.events.first()) {
                if head.aggregate_type != incoming.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        head.aggregate_type, incoming.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for stream in batch {
            let entries = inner.streams.entry(stream.aggregate_id).or_default();
            let mut next = Self::current_version(entries) + 1;
            for e in stream.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                entries.push(stored.clone());
                committed.push(stored);
            }
        }
        inner.log.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_all(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner
            .log
            .iter()
            .filter(|e| e.aggregate_type == aggregate_type)
            .cloned()
            .collect())
    }
}
