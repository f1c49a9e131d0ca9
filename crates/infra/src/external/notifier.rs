use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use umrahops_core::{AggregateId, OwnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    InvoiceBlocked,
    PaymentVerified,
    PaymentRejected,
}

/// A notification record addressed to an owner-partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub owner_id: OwnerId,
    pub order_id: Option<AggregateId>,
    pub invoice_id: Option<AggregateId>,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

/// Sink for notifications (email/WhatsApp delivery lives behind it).
///
/// Separate from the domain event stream: a lost notification never affects
/// financial state.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Fire-and-forget: failures are logged, never propagated.
pub fn notify_best_effort<N: Notifier + ?Sized>(notifier: &N, notification: Notification) {
    if let Err(err) = notifier.notify(&notification) {
        warn!(kind = ?notification.kind, owner_id = %notification.owner_id, error = %err, "notification dropped");
    }
}

/// Default notifier: records the notification in the structured log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            kind = ?notification.kind,
            owner_id = %notification.owner_id,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

/// In-memory notifier for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    inner: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        match self.inner.lock() {
            Ok(v) => v.clone(),
            Err(_) => vec![],
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.inner
            .lock()
            .map_err(|_| NotifyError("lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}
