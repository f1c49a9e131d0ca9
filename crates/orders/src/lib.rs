//! Orders domain module (event-sourced).
//!
//! Item composition, totals/penalty/headcount computation and the order
//! status lifecycle, implemented as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod branch;
pub mod number;
pub mod order;
pub mod pricing;

pub use branch::{BranchResolutionError, BranchSource, ResolvedBranch, resolve_branch};
pub use number::document_number;
pub use order::{
    CancelOrder, CompleteOrder, EditOrder, MarkInvoiced, Order, OrderCancelled, OrderCommand, OrderEvent,
    OrderId, OrderInvoiced, OrderItemsReplaced, OrderNotesChanged, OrderPlaced, OrderStatus, OrderStatusChanged,
    PaymentStage, PlaceOrder, SetBlocked, SyncPaymentStage,
};
pub use pricing::{
    ItemMeta, ItemType, OrderItem, OrderPolicy, OrderTotals, PricedItem, bus_penalty, check_composition,
    compute_totals, room_capacity,
};
