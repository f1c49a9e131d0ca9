use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use umrahops_core::{Aggregate, AggregateId, AggregateRoot, BranchId, DomainError, OwnerId, UserId};
use umrahops_events::Event;

use crate::pricing::{OrderItem, OrderPolicy, OrderTotals, PricedItem, compute_totals};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Tentative,
    Confirmed,
    Processing,
    Blocked,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Statuses in which items may be replaced or the order cancelled.
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            OrderStatus::Draft | OrderStatus::Tentative | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// How far the linked invoice has been paid, as seen by the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStage {
    /// Below the down payment.
    Unpaid,
    DpReached,
    Paid,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    owner_id: Option<OwnerId>,
    branch_id: Option<BranchId>,
    items: Vec<OrderItem>,
    totals: OrderTotals,
    status: OrderStatus,
    notes: Option<String>,
    invoice_id: Option<AggregateId>,
    placed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.invoice_id
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
///
/// A non-draft order must carry the id of the invoice issued alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub owner_id: OwnerId,
    pub branch_id: BranchId,
    pub items: Vec<PricedItem>,
    pub policy: OrderPolicy,
    pub notes: Option<String>,
    pub invoice_id: Option<AggregateId>,
    pub placed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditOrder. At least one of `items`/`notes` must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOrder {
    pub order_id: OrderId,
    pub items: Option<Vec<PricedItem>>,
    pub policy: OrderPolicy,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInvoiced (draft order gets its invoice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiced {
    pub order_id: OrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetBlocked. `true` blocks a tentative order, `false` reactivates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBlocked {
    pub order_id: OrderId,
    pub blocked: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SyncPaymentStage. Emits nothing when the status already matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPaymentStage {
    pub order_id: OrderId,
    pub stage: PaymentStage,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    EditOrder(EditOrder),
    MarkInvoiced(MarkInvoiced),
    CancelOrder(CancelOrder),
    SetBlocked(SetBlocked),
    SyncPaymentStage(SyncPaymentStage),
    CompleteOrder(CompleteOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: String,
    pub owner_id: OwnerId,
    pub branch_id: BranchId,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub invoice_id: Option<AggregateId>,
    pub placed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Items are replaced wholesale; totals recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemsReplaced {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNotesChanged {
    pub order_id: OrderId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInvoiced {
    pub order_id: OrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderItemsReplaced(OrderItemsReplaced),
    OrderNotesChanged(OrderNotesChanged),
    OrderInvoiced(OrderInvoiced),
    OrderCancelled(OrderCancelled),
    OrderStatusChanged(OrderStatusChanged),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderItemsReplaced(_) => "orders.order.items_replaced",
            OrderEvent::OrderNotesChanged(_) => "orders.order.notes_changed",
            OrderEvent::OrderInvoiced(_) => "orders.order.invoiced",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::OrderStatusChanged(_) => "orders.order.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderItemsReplaced(e) => e.occurred_at,
            OrderEvent::OrderNotesChanged(e) => e.occurred_at,
            OrderEvent::OrderInvoiced(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "orders.order";

    fn empty(id: AggregateId) -> Self {
        Self {
            id: OrderId(id),
            order_number: String::new(),
            owner_id: None,
            branch_id: None,
            items: Vec::new(),
            totals: OrderTotals::default(),
            status: OrderStatus::Draft,
            notes: None,
            invoice_id: None,
            placed_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    fn exists(&self) -> bool {
        self.created
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.owner_id = Some(e.owner_id);
                self.branch_id = Some(e.branch_id);
                self.items = e.items.clone();
                self.totals = e.totals;
                self.status = e.status;
                self.notes = e.notes.clone();
                self.invoice_id = e.invoice_id;
                self.placed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderItemsReplaced(e) => {
                self.items = e.items.clone();
                self.totals = e.totals;
            }
            OrderEvent::OrderNotesChanged(e) => {
                self.notes = e.notes.clone();
            }
            OrderEvent::OrderInvoiced(e) => {
                self.invoice_id = Some(e.invoice_id);
                self.status = OrderStatus::Tentative;
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::OrderStatusChanged(e) => {
                self.status = e.to;
            }
        }

        self.updated_at = Some(Event::occurred_at(event));
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::EditOrder(cmd) => self.handle_edit(cmd),
            OrderCommand::MarkInvoiced(cmd) => self.handle_mark_invoiced(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::SetBlocked(cmd) => self.handle_set_blocked(cmd),
            OrderCommand::SyncPaymentStage(cmd) => self.handle_sync_payment(cmd),
            OrderCommand::CompleteOrder(cmd) => self.handle_complete(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn status_change(&self, to: OrderStatus, occurred_at: DateTime<Utc>) -> Vec<OrderEvent> {
        if self.status == to {
            return Vec::new();
        }
        vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: self.id,
            from: self.status,
            to,
            occurred_at,
        })]
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.branch_id.is_nil() {
            return Err(DomainError::validation("branch_id is required"));
        }
        if cmd.owner_id.is_nil() {
            return Err(DomainError::validation("owner_id is required"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order_number is required"));
        }

        let (items, totals) = compute_totals(&cmd.items, &cmd.policy)?;
        let status = match cmd.invoice_id {
            Some(_) => OrderStatus::Tentative,
            None => OrderStatus::Draft,
        };

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.trim().to_string(),
            owner_id: cmd.owner_id,
            branch_id: cmd.branch_id,
            items,
            totals,
            status,
            notes: cmd.notes.clone(),
            invoice_id: cmd.invoice_id,
            placed_by: cmd.placed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if !self.status.is_editable() {
            return Err(DomainError::invariant(format!(
                "cannot edit an order in status {:?}",
                self.status
            )));
        }
        if cmd.items.is_none() && cmd.notes.is_none() {
            return Err(DomainError::validation("nothing to update: provide items or notes"));
        }

        let mut events = Vec::new();
        if let Some(items) = &cmd.items {
            let (items, totals) = compute_totals(items, &cmd.policy)?;
            events.push(OrderEvent::OrderItemsReplaced(OrderItemsReplaced {
                order_id: self.id,
                items,
                totals,
                occurred_at: cmd.occurred_at,
            }));
        }
        if let Some(notes) = &cmd.notes {
            if self.notes.as_deref() != Some(notes.as_str()) {
                events.push(OrderEvent::OrderNotesChanged(OrderNotesChanged {
                    order_id: self.id,
                    notes: Some(notes.clone()),
                    occurred_at: cmd.occurred_at,
                }));
            }
        }
        Ok(events)
    }

    fn handle_mark_invoiced(&self, cmd: &MarkInvoiced) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if self.invoice_id.is_some() {
            return Err(DomainError::conflict("order already has an invoice"));
        }
        if self.status != OrderStatus::Draft {
            return Err(DomainError::invariant("only draft orders can be invoiced"));
        }
        Ok(vec![OrderEvent::OrderInvoiced(OrderInvoiced {
            order_id: self.id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if !self.status.is_editable() {
            return Err(DomainError::invariant(format!(
                "cannot cancel an order in status {:?}",
                self.status
            )));
        }
        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: self.id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_blocked(&self, cmd: &SetBlocked) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        match (cmd.blocked, self.status) {
            (true, OrderStatus::Blocked) | (false, OrderStatus::Tentative) => Ok(Vec::new()),
            (true, OrderStatus::Tentative) => Ok(self.status_change(OrderStatus::Blocked, cmd.occurred_at)),
            (false, OrderStatus::Blocked) => Ok(self.status_change(OrderStatus::Tentative, cmd.occurred_at)),
            (true, status) => Err(DomainError::invariant(format!(
                "only tentative orders can be blocked (status {status:?})"
            ))),
            (false, status) => Err(DomainError::invariant(format!(
                "only blocked orders can be reactivated (status {status:?})"
            ))),
        }
    }

    fn handle_sync_payment(&self, cmd: &SyncPaymentStage) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        use OrderStatus::*;

        let target = match (cmd.stage, self.status) {
            (_, Draft | Completed | Cancelled) => None,
            (PaymentStage::Paid, Tentative | Confirmed | Blocked) => Some(Processing),
            (PaymentStage::DpReached, Tentative | Processing | Blocked) => Some(Confirmed),
            (PaymentStage::Unpaid, Confirmed | Processing) => Some(Tentative),
            _ => None,
        };

        Ok(target
            .map(|to| self.status_change(to, cmd.occurred_at))
            .unwrap_or_default())
    }

    fn handle_complete(&self, cmd: &CompleteOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        if self.status != OrderStatus::Processing {
            return Err(DomainError::invariant("only processing orders can be completed"));
        }
        Ok(self.status_change(OrderStatus::Completed, cmd.occurred_at))
    }
}
