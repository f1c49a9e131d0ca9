use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use umrahops_catalog::{Currency, PriceQuery, ProductId, resolve_price_in_idr, round_to_rupiah};
use umrahops_core::{AggregateId, BranchId, DomainError, OwnerId, UserId};
use umrahops_events::{EventBus, EventEnvelope};
use umrahops_invoicing::{CancelInvoice, Invoice, InvoiceCommand, InvoiceId, InvoiceStatus, IssueInvoice, ResyncTotal};
use umrahops_orders::{
    CancelOrder, CompleteOrder, EditOrder, ItemMeta, ItemType, MarkInvoiced, Order, OrderCommand, OrderId,
    OrderPolicy, PlaceOrder, PricedItem, document_number, resolve_branch,
};
use umrahops_rules::BusinessRules;

use super::Backoffice;
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::external::{Notification, NotificationKind};

/// One requested order line; without `unit_price` the catalog price applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub item_type: ItemType,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: Option<u64>,
    #[serde(default)]
    pub meta: ItemMeta,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub owner_id: OwnerId,
    /// Branch named in the request body, unparsed.
    pub requested_branch: Option<String>,
    /// Branch on the caller's profile.
    pub profile_branch: Option<BranchId>,
    /// Configured branch for head-office roles.
    pub default_branch: Option<BranchId>,
    pub items: Vec<LineRequest>,
    pub notes: Option<String>,
    /// Drafts are placed without an invoice.
    pub draft: bool,
    pub super_promo: bool,
    pub placed_by: UserId,
}

#[derive(Debug, Clone, Default)]
pub struct OrderChanges {
    pub items: Option<Vec<LineRequest>>,
    pub notes: Option<String>,
}

/// An order with its invoice (absent for drafts).
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub order: Order,
    pub invoice: Option<Invoice>,
}

impl<S, B> Backoffice<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Place an order and, unless it is a draft, issue its invoice in the
    /// same unit of work.
    #[instrument(skip(self, request, now), fields(owner_id = %request.owner_id, draft = request.draft))]
    pub fn create_order(&self, request: NewOrder, now: DateTime<Utc>) -> Result<OrderPlacement, DispatchError> {
        let branch = resolve_branch(
            request.requested_branch.as_deref(),
            request.profile_branch,
            request.default_branch,
        )
        .map_err(DomainError::from)?;
        let branch_id = branch.branch_id;
        let owner_id = request.owner_id;

        let rules = self.business_rules(Some(branch_id))?;
        let items = self.price_lines(&request.items, branch_id, owner_id, &rules, now.date_naive())?;

        let order_id = AggregateId::new();
        let invoice_id = (!request.draft).then(AggregateId::new);
        let dp_percentage = rules.dp_percentage_for(request.super_promo);

        let placement = self.dispatcher.transact(|tx| {
            let place = PlaceOrder {
                order_id: OrderId(order_id),
                order_number: document_number("ORD", now, &order_id),
                owner_id,
                branch_id,
                items: items.clone(),
                policy: OrderPolicy::from(&rules),
                notes: request.notes.clone(),
                invoice_id,
                placed_by: request.placed_by,
                occurred_at: now,
            };
            let order = tx.execute::<Order>(order_id, &OrderCommand::PlaceOrder(place))?;

            let invoice = match invoice_id {
                Some(invoice_id) => {
                    let issue = issue_command(&order, invoice_id, dp_percentage, &rules, now)?;
                    Some(tx.execute::<Invoice>(invoice_id, &InvoiceCommand::IssueInvoice(issue))?)
                }
                None => None,
            };
            Ok(OrderPlacement { order, invoice })
        })?;

        info!(
            order_id = %order_id,
            order_number = placement.order.order_number(),
            branch_source = ?branch.source,
            total_amount = placement.order.totals().total_amount,
            invoice_id = ?invoice_id,
            "order created"
        );
        self.notify(Notification {
            kind: NotificationKind::OrderCreated,
            owner_id,
            order_id: Some(order_id),
            invoice_id,
            message: format!("Order {} created", placement.order.order_number()),
        });

        Ok(placement)
    }

    /// Replace items and/or notes; a linked invoice follows the new total.
    #[instrument(skip(self, changes, now))]
    pub fn edit_order(
        &self,
        order_id: AggregateId,
        changes: OrderChanges,
        now: DateTime<Utc>,
    ) -> Result<OrderPlacement, DispatchError> {
        let current = self.order(order_id)?;
        let (branch_id, owner_id) = placed_scope(&current)?;
        let rules = self.business_rules(Some(branch_id))?;
        let items = changes
            .items
            .as_deref()
            .map(|lines| self.price_lines(lines, branch_id, owner_id, &rules, now.date_naive()))
            .transpose()?;

        let placement = self.dispatcher.transact(|tx| {
            let edit = EditOrder {
                order_id: OrderId(order_id),
                items: items.clone(),
                policy: OrderPolicy::from(&rules),
                notes: changes.notes.clone(),
                occurred_at: now,
            };
            let order = tx.execute::<Order>(order_id, &OrderCommand::EditOrder(edit))?;

            let invoice = match order.invoice_id() {
                Some(invoice_id) if items.is_some() => {
                    let resync = ResyncTotal {
                        invoice_id: InvoiceId(invoice_id),
                        total_amount: order.totals().total_amount,
                        occurred_at: now,
                    };
                    let invoice = tx.execute::<Invoice>(invoice_id, &InvoiceCommand::ResyncTotal(resync))?;
                    super::sync_order_stage(tx, &invoice, now)?;
                    Some(invoice)
                }
                Some(invoice_id) => Some(tx.load_existing::<Invoice>(invoice_id)?),
                None => None,
            };
            let order = tx.load_existing::<Order>(order_id)?;
            Ok(OrderPlacement { order, invoice })
        })?;

        info!(
            order_id = %order_id,
            total_amount = placement.order.totals().total_amount,
            items_replaced = items.is_some(),
            "order edited"
        );
        Ok(placement)
    }

    /// Cancel an unpaid order together with its invoice.
    #[instrument(skip(self, reason, now))]
    pub fn cancel_order(
        &self,
        order_id: AggregateId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<OrderPlacement, DispatchError> {
        let placement = self.dispatcher.transact(|tx| {
            let cancel = CancelOrder {
                order_id: OrderId(order_id),
                reason: reason.clone(),
                occurred_at: now,
            };
            let order = tx.execute::<Order>(order_id, &OrderCommand::CancelOrder(cancel))?;

            let invoice = match order.invoice_id() {
                Some(invoice_id) => {
                    let invoice = tx.load_existing::<Invoice>(invoice_id)?;
                    if invoice.paid_amount() > 0 {
                        return Err(DispatchError::InvariantViolation(format!(
                            "cannot cancel order {}: invoice {} has verified payments",
                            order.order_number(),
                            invoice.invoice_number()
                        )));
                    }
                    if invoice.status() == InvoiceStatus::Canceled {
                        Some(invoice)
                    } else {
                        let cancel = CancelInvoice {
                            invoice_id: InvoiceId(invoice_id),
                            reason: reason.clone(),
                            occurred_at: now,
                        };
                        Some(tx.execute::<Invoice>(invoice_id, &InvoiceCommand::CancelInvoice(cancel))?)
                    }
                }
                None => None,
            };
            Ok(OrderPlacement { order, invoice })
        })?;

        info!(order_id = %order_id, "order cancelled");
        Ok(placement)
    }

    #[instrument(skip(self, now))]
    pub fn complete_order(&self, order_id: AggregateId, now: DateTime<Utc>) -> Result<Order, DispatchError> {
        let order = self.dispatcher.dispatch::<Order>(
            order_id,
            OrderCommand::CompleteOrder(CompleteOrder {
                order_id: OrderId(order_id),
                occurred_at: now,
            }),
        )?;
        info!(order_id = %order_id, "order completed");
        Ok(order)
    }

    /// Issue the invoice of a draft order.
    #[instrument(skip(self, now))]
    pub fn issue_invoice(
        &self,
        order_id: AggregateId,
        super_promo: bool,
        now: DateTime<Utc>,
    ) -> Result<OrderPlacement, DispatchError> {
        let current = self.order(order_id)?;
        let (branch_id, _) = placed_scope(&current)?;
        let rules = self.business_rules(Some(branch_id))?;
        let dp_percentage = rules.dp_percentage_for(super_promo);
        let invoice_id = AggregateId::new();

        let placement = self.dispatcher.transact(|tx| {
            let order = tx.load_existing::<Order>(order_id)?;
            if let Some(existing) = order.invoice_id() {
                return Err(DispatchError::Conflict(format!(
                    "order {} already has invoice {existing}",
                    order.order_number()
                )));
            }

            let issue = issue_command(&order, invoice_id, dp_percentage, &rules, now)?;
            let invoice = tx.execute::<Invoice>(invoice_id, &InvoiceCommand::IssueInvoice(issue))?;
            let order = tx.execute::<Order>(
                order_id,
                &OrderCommand::MarkInvoiced(MarkInvoiced {
                    order_id: OrderId(order_id),
                    invoice_id,
                    occurred_at: now,
                }),
            )?;
            Ok(OrderPlacement {
                order,
                invoice: Some(invoice),
            })
        })?;

        info!(order_id = %order_id, invoice_id = %invoice_id, dp_percentage, "invoice issued");
        Ok(placement)
    }

    /// Fix the unit price of every line: explicit price first, else the
    /// catalog price for the order's branch and owner, converted to rupiah.
    fn price_lines(
        &self,
        lines: &[LineRequest],
        branch_id: BranchId,
        owner_id: OwnerId,
        rules: &BusinessRules,
        today: NaiveDate,
    ) -> Result<Vec<PricedItem>, DispatchError> {
        lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let unit_price = match (line.unit_price, line.product_id) {
                    (Some(price), _) => price,
                    (None, Some(product_id)) => self.catalog_price(product_id, branch_id, owner_id, rules, today)?,
                    (None, None) => {
                        return Err(DispatchError::Validation(format!(
                            "item {} needs a product_id or a unit_price",
                            idx + 1
                        )));
                    }
                };
                Ok(PricedItem {
                    item_type: line.item_type,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price,
                    meta: line.meta.clone(),
                })
            })
            .collect()
    }

    fn catalog_price(
        &self,
        product_id: ProductId,
        branch_id: BranchId,
        owner_id: OwnerId,
        rules: &BusinessRules,
        today: NaiveDate,
    ) -> Result<u64, DispatchError> {
        let product = self.catalog.product(product_id)?.ok_or(DispatchError::NotFound)?;
        if !product.active {
            return Err(DispatchError::Validation(format!("product {} is inactive", product.code)));
        }
        let query = PriceQuery {
            product_id,
            branch_id: Some(branch_id),
            owner_id: Some(owner_id),
            currency: Currency::Idr,
        };
        let candidates = self.catalog.prices_for(product_id)?;
        let resolved = resolve_price_in_idr(&candidates, &query, &rules.currency_rates, today)?
            .ok_or(DispatchError::PriceNotFound(product_id))?;
        Ok(round_to_rupiah(resolved.amount)?)
    }
}

fn placed_scope(order: &Order) -> Result<(BranchId, OwnerId), DispatchError> {
    match (order.branch_id(), order.owner_id()) {
        (Some(branch_id), Some(owner_id)) => Ok((branch_id, owner_id)),
        _ => Err(DispatchError::NotFound),
    }
}

fn issue_command(
    order: &Order,
    invoice_id: AggregateId,
    dp_percentage: u8,
    rules: &BusinessRules,
    issued_at: DateTime<Utc>,
) -> Result<IssueInvoice, DispatchError> {
    let (branch_id, owner_id) = placed_scope(order)?;
    Ok(IssueInvoice {
        invoice_id: InvoiceId(invoice_id),
        invoice_number: document_number("INV", issued_at, &invoice_id),
        order_id: order.id_typed(),
        owner_id,
        branch_id,
        total_amount: order.totals().total_amount,
        dp_percentage,
        dp_due_days: rules.dp_due_days,
        dp_grace_hours: rules.dp_grace_hours,
        issued_at,
    })
}
