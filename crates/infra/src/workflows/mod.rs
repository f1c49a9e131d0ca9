//! Back-office use cases.
//!
//! Each mutating operation is one unit of work over the order and invoice
//! streams it touches (see [`CommandDispatcher::transact`]). Reference data
//! (prices, rules) is read before the unit of work starts; ids are minted
//! up front so a retried unit of work writes the same streams.

mod invoices;
mod orders;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use umrahops_catalog::{Conversions, Currency, PriceQuery, ProductId, ResolvedPrice, resolve_price, resolve_price_in_idr};
use umrahops_core::{AggregateId, BranchId, OwnerId};
use umrahops_events::{EventBus, EventEnvelope};
use umrahops_invoicing::Invoice;
use umrahops_orders::{Order, OrderCommand, PaymentStage, SyncPaymentStage};
use umrahops_rules::BusinessRules;

use crate::command_dispatcher::{CommandDispatcher, DispatchError, Transaction};
use crate::event_store::EventStore;
use crate::external::{Notification, Notifier, notify_best_effort};
use crate::reference::{CatalogStore, RuleStore, business_rules};

pub use invoices::{OverpaymentOutcome, ProofSubmission};
pub use orders::{LineRequest, NewOrder, OrderChanges, OrderPlacement};

/// A resolved price with its amount in every supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    #[serde(flatten)]
    pub resolved: ResolvedPrice,
    pub conversions: Conversions,
}

pub struct Backoffice<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    catalog: Arc<dyn CatalogStore>,
    rules: Arc<dyn RuleStore>,
    notifier: Arc<dyn Notifier>,
}

impl<S, B> Backoffice<S, B> {
    pub fn new(
        dispatcher: CommandDispatcher<S, B>,
        catalog: Arc<dyn CatalogStore>,
        rules: Arc<dyn RuleStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            dispatcher,
            catalog,
            rules,
            notifier,
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn catalog(&self) -> &dyn CatalogStore {
        self.catalog.as_ref()
    }

    pub fn rules(&self) -> &dyn RuleStore {
        self.rules.as_ref()
    }

    fn notify(&self, notification: Notification) {
        notify_best_effort(self.notifier.as_ref(), notification);
    }
}

impl<S, B> Backoffice<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Strongly consistent order read (rehydrated from its stream).
    pub fn order(&self, order_id: AggregateId) -> Result<Order, DispatchError> {
        self.dispatcher.load::<Order>(order_id)?.ok_or(DispatchError::NotFound)
    }

    /// Rules in effect for a branch (`None` = global + defaults).
    pub fn business_rules(&self, branch_id: Option<BranchId>) -> Result<BusinessRules, DispatchError> {
        Ok(business_rules(self.rules.as_ref(), branch_id)?)
    }

    /// Resolve a catalog price and express it in IDR, SAR and USD.
    ///
    /// With `currency = None` the IDR-first resolution used for order lines
    /// applies; otherwise only rows in that currency are considered.
    pub fn quote_price(
        &self,
        product_id: ProductId,
        branch_id: Option<BranchId>,
        owner_id: Option<OwnerId>,
        currency: Option<Currency>,
        today: NaiveDate,
    ) -> Result<PriceQuote, DispatchError> {
        self.catalog.product(product_id)?.ok_or(DispatchError::NotFound)?;
        let rates = self.business_rules(branch_id)?.currency_rates;
        let candidates = self.catalog.prices_for(product_id)?;
        let query = PriceQuery {
            product_id,
            branch_id,
            owner_id,
            currency: currency.unwrap_or(Currency::Idr),
        };
        let resolved = match currency {
            Some(_) => resolve_price(&candidates, &query, today),
            None => resolve_price_in_idr(&candidates, &query, &rates, today)?,
        }
        .ok_or(DispatchError::PriceNotFound(product_id))?;

        Ok(PriceQuote {
            resolved,
            conversions: rates.conversions(resolved.amount, resolved.currency)?,
        })
    }
}

/// Move the invoice's order to the status its payment stage implies.
fn sync_order_stage<S: EventStore>(
    tx: &mut Transaction<'_, S>,
    invoice: &Invoice,
    now: DateTime<Utc>,
) -> Result<(), DispatchError> {
    let Some(order_id) = invoice.order_id() else {
        return Ok(());
    };
    let stage: PaymentStage = invoice.status().payment_stage();
    tx.execute::<Order>(
        order_id.0,
        &OrderCommand::SyncPaymentStage(SyncPaymentStage {
            order_id,
            stage,
            occurred_at: now,
        }),
    )?;
    Ok(())
}
