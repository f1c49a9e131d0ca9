use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use umrahops_core::{AggregateId, ExpectedVersion};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Built from a typed domain event via [`UncommittedEvent::from_typed`], which
/// serializes the payload and captures the metadata needed to deserialize it
/// again on rehydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers are stream-scoped, start at 1 and never have gaps. They
/// drive optimistic concurrency on append and idempotency in projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an envelope for publication.
    pub fn to_envelope(&self) -> umrahops_events::EventEnvelope<JsonValue> {
        umrahops_events::EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Events for one stream inside an atomic multi-stream append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Event store operation error.
///
/// Infrastructure errors (storage, concurrency) as opposed to domain errors.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl EventStoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, EventStoreError::Concurrency(_))
    }
}

/// Append-only event store.
///
/// Events are organized into one stream per aggregate instance, keyed by
/// `aggregate_id`. Within a stream, sequence numbers run 1, 2, 3, ...
///
/// `append_batch` is the unit of atomicity: either every stream in the batch
/// passes its expected-version check and all events are persisted, or
/// nothing is written. Implementations must:
/// - reject a batch that names the same stream twice
/// - reject events whose aggregate id/type disagrees with their stream
/// - assign sequence numbers starting at `current_version + 1`
pub trait EventStore: Send + Sync {
    /// Atomically append events to several streams.
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for an aggregate, ordered by sequence number.
    ///
    /// Returns an empty vector if the stream does not exist.
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load every event of one aggregate type in commit order (projection rebuild).
    fn load_all(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Append events to a single aggregate stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        self.append_batch(vec![StreamAppend {
            aggregate_id,
            expected_version,
            events,
        }])
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_batch(batch)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn load_all(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all(aggregate_type)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed domain event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: umrahops_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Validate the shape of a batch before touching storage.
///
/// Shared by every backend so they reject exactly the same inputs.
pub(crate) fn validate_batch(batch: &[StreamAppend]) -> Result<(), EventStoreError> {
    let mut seen = std::collections::HashSet::new();
    for stream in batch {
        if !seen.insert(stream.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one batch",
                stream.aggregate_id
            )));
        }
        let Some(first) = stream.events.first() else {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} has no events",
                stream.aggregate_id
            )));
        };
        for (idx, e) in stream.events.iter().enumerate() {
            if e.aggregate_id != stream.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch for {} contains event for {} (index {idx})",
                    stream.aggregate_id, e.aggregate_id
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream {} mixes '{}' and '{}'",
                    stream.aggregate_id, first.aggregate_type, e.aggregate_type
                )));
            }
        }
    }
    Ok(())
}
