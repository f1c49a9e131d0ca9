//! Infrastructure layer: event store, unit of work, reference data stores,
//! projections, background workers and the back-office workflows.

pub mod command_dispatcher;
pub mod event_store;
pub mod external;
#[cfg(feature = "postgres")]
pub mod pg;
pub mod projections;
pub mod read_model;
pub mod reference;
pub mod workers;
pub mod workflows;
