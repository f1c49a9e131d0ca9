//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! transact(work)
//!   ↓
//! 1. work() loads the aggregates it needs (rehydrated from their streams)
//!   ↓
//! 2. work() executes commands; events are applied to the in-transaction
//!    state and staged per stream with the version each stream was read at
//!   ↓
//! 3. every staged stream is appended in ONE atomic batch
//!   ↓
//! 4. committed events are published to the bus (projections)
//! ```
//!
//! A concurrency conflict on step 3 discards the staged state and re-runs
//! the whole unit of work from fresh reads, up to [`MAX_ATTEMPTS`] times.
//! This serializes concurrent writers on the same invoice without locks
//! held across command decisions.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use std::any::Any;
use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use umrahops_catalog::ProductId;
use umrahops_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use umrahops_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Attempts per unit of work before a conflict is surfaced to the caller.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    /// Duplicate or stale write (retries exhausted).
    #[error("conflict: {0}")]
    Conflict(String),
    /// No effective price row and no explicit unit price.
    #[error("no effective price for product {0}")]
    PriceNotFound(ProductId),
    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    /// Reference data or file storage failure.
    #[error("storage failure: {0}")]
    Storage(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Conflict(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `work` as one atomic unit of work, retrying on version conflicts.
    ///
    /// `work` may run several times and must not perform side effects other
    /// than through the transaction.
    pub fn transact<T>(
        &self,
        mut work: impl FnMut(&mut Transaction<'_, S>) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let mut attempt = 1;
        loop {
            let mut tx = Transaction::new(&self.store);
            let value = work(&mut tx)?;
            let batch = tx.into_batch();
            if batch.is_empty() {
                return Ok(value);
            }

            match self.store.append_batch(batch) {
                Ok(committed) => {
                    self.publish(&committed)?;
                    return Ok(value);
                }
                Err(err) if err.is_concurrency() && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %err, "unit of work conflicted, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Single-aggregate convenience over [`Self::transact`].
    pub fn dispatch<A>(&self, aggregate_id: AggregateId, command: A::Command) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError> + Clone + 'static,
        A::Event: umrahops_events::Event + Serialize + DeserializeOwned,
    {
        self.transact(|tx| tx.execute::<A>(aggregate_id, &command))
    }

    /// Rehydrate an aggregate straight from its stream (strongly consistent read).
    pub fn load<A>(&self, aggregate_id: AggregateId) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, A::AGGREGATE_TYPE, &history)?;
        let mut aggregate = A::empty(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate.exists().then_some(aggregate))
    }

    fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

struct Staged {
    expected: u64,
    state: Box<dyn Any>,
    pending: Vec<UncommittedEvent>,
}

/// Aggregates loaded and commands staged within one unit of work.
///
/// Loading the same aggregate twice returns the in-transaction state,
/// including events staged earlier in the same unit of work.
pub struct Transaction<'s, S> {
    store: &'s S,
    streams: HashMap<AggregateId, Staged>,
    order: Vec<AggregateId>,
}

impl<'s, S: EventStore> Transaction<'s, S> {
    fn new(store: &'s S) -> Self {
        Self {
            store,
            streams: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Current state of an aggregate (blank if the stream does not exist).
    pub fn load<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: Aggregate + Clone + 'static,
        A::Event: DeserializeOwned,
    {
        self.ensure_loaded::<A>(aggregate_id)?;
        let (state, _) = self.staged_mut::<A>(aggregate_id)?;
        Ok(state.clone())
    }

    /// Like [`Self::load`] but fails with `NotFound` for a missing aggregate.
    pub fn load_existing<A>(&mut self, aggregate_id: AggregateId) -> Result<A, DispatchError>
    where
        A: Aggregate + Clone + 'static,
        A::Event: DeserializeOwned,
    {
        let aggregate = self.load::<A>(aggregate_id)?;
        if !aggregate.exists() {
            return Err(DispatchError::NotFound);
        }
        Ok(aggregate)
    }

    /// Decide and apply a command; returns the post-command state.
    pub fn execute<A>(&mut self, aggregate_id: AggregateId, command: &A::Command) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError> + Clone + 'static,
        A::Event: umrahops_events::Event + Serialize + DeserializeOwned,
    {
        self.ensure_loaded::<A>(aggregate_id)?;
        let (state, pending) = self.staged_mut::<A>(aggregate_id)?;
        let mut next = state.clone();
        let events = umrahops_events::execute(&mut next, command)?;
        if let Err(e) = next.check_invariants() {
            tracing::error!(
                %aggregate_id,
                aggregate_type = A::AGGREGATE_TYPE,
                error = %e,
                "command left aggregate inconsistent"
            );
            let msg = match e {
                DomainError::InvariantViolation(msg) => msg,
                other => other.to_string(),
            };
            return Err(DispatchError::InvariantViolation(msg));
        }
        *state = next;
        for ev in &events {
            pending.push(UncommittedEvent::from_typed(
                aggregate_id,
                A::AGGREGATE_TYPE,
                Uuid::now_v7(),
                ev,
            )?);
        }
        Ok(state.clone())
    }

    fn ensure_loaded<A>(&mut self, aggregate_id: AggregateId) -> Result<(), DispatchError>
    where
        A: Aggregate + 'static,
        A::Event: DeserializeOwned,
    {
        if self.streams.contains_key(&aggregate_id) {
            return Ok(());
        }
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, A::AGGREGATE_TYPE, &history)?;
        let mut aggregate = A::empty(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        self.streams.insert(
            aggregate_id,
            Staged {
                expected: stream_version(&history),
                state: Box::new(aggregate),
                pending: Vec::new(),
            },
        );
        self.order.push(aggregate_id);
        Ok(())
    }

    fn staged_mut<A: 'static>(
        &mut self,
        aggregate_id: AggregateId,
    ) -> Result<(&mut A, &mut Vec<UncommittedEvent>), DispatchError> {
        let staged = self
            .streams
            .get_mut(&aggregate_id)
            .ok_or(DispatchError::NotFound)?;
        let state = staged.state.downcast_mut::<A>().ok_or_else(|| {
            DispatchError::Store(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} was loaded as a different aggregate type"
            )))
        })?;
        Ok((state, &mut staged.pending))
    }

    fn into_batch(self) -> Vec<StreamAppend> {
        let Transaction {
            mut streams, order, ..
        } = self;
        order
            .into_iter()
            .filter_map(|id| {
                let staged = streams.remove(&id)?;
                (!staged.pending.is_empty()).then(|| StreamAppend {
                    aggregate_id: id,
                    expected_version: ExpectedVersion::Exact(staged.expected),
                    events: staged.pending,
                })
            })
            .collect()
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.aggregate_type != aggregate_type {
            return Err(DispatchError::Store(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} holds '{}', expected '{aggregate_type}'",
                e.aggregate_type
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
