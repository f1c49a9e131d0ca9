//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction for appending and loading aggregate event
//! streams, with an atomic multi-stream append used by the unit of work.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
