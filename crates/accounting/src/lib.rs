//! Accounting reports (receivables aging).
//!
//! Pure read-side aggregation over invoice snapshots: no IO, no persisted
//! state.

pub mod aging;

pub use aging::{
    AgingBucket, AgingFilter, AgingInput, AgingLine, AgingReport, BucketTotal, bucket_for, build_aging_report,
    days_overdue,
};
