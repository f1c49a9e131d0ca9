use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use umrahops_core::{Aggregate, AggregateId};
use umrahops_events::EventEnvelope;

use crate::event_store::StoredEvent;
use crate::read_model::ReadStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),
    #[error("non-monotonic sequence number for {aggregate_id} (last={last}, found={found})")]
    NonMonotonicSequence {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },
}

/// Keeps the latest state of every aggregate of one type, folded from the bus.
///
/// - Idempotent: envelopes at or below the per-stream cursor are ignored
/// - Gaps are reported, never skipped silently
/// - Rebuildable from the event store via [`Self::rebuild`]
#[derive(Debug)]
pub struct AggregateStateProjection<A, S> {
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A, S> AggregateStateProjection<A, S>
where
    A: Aggregate + Clone,
    A::Event: DeserializeOwned,
    S: ReadStore<AggregateId, A>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            _aggregate: PhantomData,
        }
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => cursors.get(&aggregate_id).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != A::AGGREGATE_TYPE {
            return Ok(());
        }
        self.apply_raw(envelope.aggregate_id(), envelope.sequence_number(), envelope.payload())
    }

    fn apply_raw(&self, aggregate_id: AggregateId, seq: u64, payload: &JsonValue) -> Result<(), ProjectionError> {
        let last = self.cursor(aggregate_id);
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                aggregate_id,
                last,
                found: seq,
            });
        }

        let ev: A::Event =
            serde_json::from_value(payload.clone()).map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let mut state = self
            .store
            .get(&aggregate_id)
            .unwrap_or_else(|| A::empty(aggregate_id));
        state.apply(&ev);
        self.store.upsert(aggregate_id, state);

        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(aggregate_id, seq);
        }
        Ok(())
    }

    /// Drop everything and replay the given events (commit order).
    pub fn rebuild(&self, events: &[StoredEvent]) -> Result<usize, ProjectionError> {
        self.store.clear();
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        let mut applied = 0;
        for e in events.iter().filter(|e| e.aggregate_type == A::AGGREGATE_TYPE) {
            self.apply_raw(e.aggregate_id, e.sequence_number, &e.payload)?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Option<A> {
        self.store.get(&aggregate_id).filter(|a| a.exists())
    }

    pub fn list(&self) -> Vec<A> {
        self.store.list().into_iter().filter(|a| a.exists()).collect()
    }
}
