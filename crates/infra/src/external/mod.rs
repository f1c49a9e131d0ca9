//! External collaborators: proof file storage and notification dispatch.

pub mod notifier;
pub mod storage;

pub use notifier::{InMemoryNotifier, Notification, NotificationKind, Notifier, NotifyError, TracingNotifier, notify_best_effort};
pub use storage::{LocalProofStorage, ProofStorage, StorageError};
