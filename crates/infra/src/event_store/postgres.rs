//! Postgres-backed event store implementation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | EventStoreError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / network / other | N/A | `Backend` |
//!
//! ## Atomicity
//!
//! A batch runs in one transaction. Each touched stream is locked with
//! `pg_advisory_xact_lock` (in aggregate id order, so two batches touching
//! the same streams cannot deadlock), its version is checked, then rows are
//! inserted. The unique `(aggregate_id, sequence_number)` constraint is the
//! last line against concurrent writers.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use umrahops_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batch};
use crate::pg::block_on;

/// Postgres-backed append-only event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Load all events for an aggregate stream (ascending sequence).
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(row_to_stored).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn load_all_async(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_type = $1
            ORDER BY global_position ASC
            "#,
        )
        .bind(aggregate_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(row_to_stored).collect()
    }

    /// Append a multi-stream batch in a single transaction.
    #[instrument(skip(self, batch), fields(streams = batch.len()), err)]
    pub async fn append_batch_async(&self, mut batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&batch)?;
        batch.sort_by_key(|s| s.aggregate_id);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut committed = Vec::new();
        for stream in batch {
            lock_stream(&mut tx, stream.aggregate_id).await?;
            let (current_version, existing_type) = check_stream_version(&mut tx, stream.aggregate_id).await?;

            if let (Some(existing), Some(incoming)) = (existing_type.as_ref(), stream.events.first()) {
                if existing != &incoming.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{existing}', attempted append with '{}'",
                        incoming.aggregate_type
                    )));
                }
            }
            if !stream.expected_version.matches(current_version) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current_version}",
                    stream.aggregate_id, stream.expected_version
                )));
            }

            let mut next_sequence = current_version + 1;
            for event in stream.events {
                sqlx::query(
                    r#"
                    INSERT INTO events (
                        event_id, aggregate_id, aggregate_type, sequence_number,
                        event_type, event_version, occurred_at, payload
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(event.event_id)
                .bind(event.aggregate_id.as_uuid())
                .bind(&event.aggregate_type)
                .bind(next_sequence as i64)
                .bind(&event.event_type)
                .bind(event.event_version as i32)
                .bind(event.occurred_at)
                .bind(&event.payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        EventStoreError::Concurrency(format!(
                            "concurrent append detected: sequence_number {next_sequence} already exists"
                        ))
                    } else {
                        map_sqlx_error("insert_event", e)
                    }
                })?;

                committed.push(StoredEvent {
                    event_id: event.event_id,
                    aggregate_id: event.aggregate_id,
                    aggregate_type: event.aggregate_type,
                    sequence_number: next_sequence,
                    event_type: event.event_type,
                    event_version: event.event_version,
                    occurred_at: event.occurred_at,
                    payload: event.payload,
                });
                next_sequence += 1;
            }
        }

        // Dropping `tx` on an early return rolls back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }
}

async fn lock_stream(tx: &mut Transaction<'_, Postgres>, aggregate_id: AggregateId) -> Result<(), EventStoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(aggregate_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stream", e))?;
    Ok(())
}

/// Returns `(current_version, aggregate_type)`; `(0, None)` for a new stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = $1
        "#,
    )
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: Option<i64> = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Backend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Backend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current_version.unwrap_or(0) as u64, aggregate_type))
}

fn row_to_stored(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let decode = |e: sqlx::Error| EventStoreError::Backend(format!("failed to decode event row: {e}"));
    let aggregate_id: uuid::Uuid = row.try_get("aggregate_id").map_err(decode)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(decode)?;
    let event_version: i32 = row.try_get("event_version").map_err(decode)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(decode)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(decode)?,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(decode)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(decode)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => EventStoreError::Backend(format!("connection pool closed in {operation}")),
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

impl EventStore for PostgresEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.append_batch_async(batch)).map_err(EventStoreError::Backend)?
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_stream_async(aggregate_id)).map_err(EventStoreError::Backend)?
    }

    fn load_all(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_all_async(aggregate_type)).map_err(EventStoreError::Backend)?
    }
}
