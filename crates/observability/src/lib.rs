//! Tracing and logging setup shared by the binaries.

pub mod tracing;

pub use tracing::{LogFormat, ParseLogFormatError};

/// Initialize process-wide logging.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}
