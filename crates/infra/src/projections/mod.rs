//! Projection implementations (read model builders).
//!
//! Order and invoice lists are served from aggregate-state projections fed
//! by the event bus. They are eventually consistent; detail reads go to the
//! event store instead.

pub mod aggregate_state;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use umrahops_accounting::{AgingFilter, AgingInput, AgingReport, build_aging_report};
use umrahops_core::AggregateId;
use umrahops_invoicing::Invoice;
use umrahops_orders::Order;

use crate::read_model::InMemoryReadStore;

pub use aggregate_state::{AggregateStateProjection, ProjectionError};

pub type OrdersProjection = AggregateStateProjection<Order, Arc<InMemoryReadStore<AggregateId, Order>>>;
pub type InvoicesProjection = AggregateStateProjection<Invoice, Arc<InMemoryReadStore<AggregateId, Invoice>>>;

pub fn orders_projection() -> OrdersProjection {
    AggregateStateProjection::new(Arc::new(InMemoryReadStore::new()))
}

pub fn invoices_projection() -> InvoicesProjection {
    AggregateStateProjection::new(Arc::new(InMemoryReadStore::new()))
}

/// Aging view of an invoice; `None` until the invoice has been issued.
pub fn aging_input(invoice: &Invoice) -> Option<AgingInput> {
    Some(AgingInput {
        invoice_id: invoice.id_typed().0,
        invoice_number: invoice.invoice_number().to_string(),
        branch_id: invoice.branch_id()?,
        owner_id: invoice.owner_id()?,
        status: invoice.status(),
        is_blocked: invoice.is_blocked(),
        remaining_amount: invoice.remaining_amount(),
        due_date_dp: invoice.due_date_dp(),
        issued_at: invoice.issued_at(),
    })
}

/// Aging report over the projected invoices.
pub fn aging_report(invoices: &InvoicesProjection, filter: &AgingFilter, now: DateTime<Utc>) -> AgingReport {
    let inputs: Vec<AgingInput> = invoices.list().iter().filter_map(aging_input).collect();
    build_aging_report(&inputs, filter, now)
}

/// Invoices that look due for auto-block in the projection; the sweep
/// re-checks each against its stream before blocking.
pub fn block_candidates(invoices: &InvoicesProjection, now: DateTime<Utc>) -> Vec<AggregateId> {
    invoices
        .list()
        .into_iter()
        .filter(|inv| inv.is_due_for_block(now))
        .map(|inv| inv.id_typed().0)
        .collect()
}
