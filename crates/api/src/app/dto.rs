use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use umrahops_auth::{CommandAuthorization, Permission};
use umrahops_catalog::{Currency, ProductKind};
use umrahops_core::{AggregateId, BranchId, OwnerId};
use umrahops_infra::workflows::{LineRequest, OrderPlacement};
use umrahops_invoicing::{Invoice, InvoiceStatus, OverpaidHandling, PaymentProof};
use umrahops_orders::{Order, OrderItem, OrderStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineRequest>,
    /// Raw, so a malformed id can be reported as a branch resolution failure.
    pub branch_id: Option<String>,
    /// Required for staff placing an order on behalf of an owner.
    pub owner_id: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub is_super_promo: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub items: Option<Vec<LineRequest>>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub order_id: String,
    #[serde(default)]
    pub is_super_promo: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub payment_proof_id: String,
    pub verified: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveOverpaidRequest {
    pub handling: OverpaidHandling,
    pub target_invoice_id: Option<String>,
    pub target_order_id: Option<String>,
}

impl ResolveOverpaidRequest {
    /// The id matching the chosen handling (`None` for refunds).
    pub fn target(&self) -> Option<&str> {
        match self.handling {
            OverpaidHandling::Refund => None,
            OverpaidHandling::TransferInvoice => self.target_invoice_id.as_deref(),
            OverpaidHandling::TransferOrder => self.target_order_id.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub code: String,
    pub name: String,
    pub kind: ProductKind,
}

#[derive(Debug, Deserialize)]
pub struct CreatePriceRequest {
    pub product_id: String,
    pub branch_id: Option<BranchId>,
    pub owner_id: Option<OwnerId>,
    pub currency: Currency,
    pub amount: Decimal,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
}

/// `{branch_id?, rules: {"dp_percentage": 40, "currency_rates": {...}}}`.
///
/// Values are stored as text; non-string JSON is kept in its JSON form.
#[derive(Debug, Deserialize)]
pub struct UpdateRulesRequest {
    pub branch_id: Option<BranchId>,
    pub rules: BTreeMap<String, serde_json::Value>,
}

pub fn rule_value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub branch_id: Option<String>,
    pub owner_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub branch_id: Option<String>,
    pub owner_id: Option<String>,
    pub blocked: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgingQuery {
    pub branch_id: Option<String>,
    pub owner_id: Option<String>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ResolvePriceQuery {
    pub product_id: String,
    pub branch_id: Option<String>,
    pub owner_id: Option<String>,
    /// Restrict to rows in this currency; default is IDR-first.
    pub currency: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RulesQuery {
    pub branch_id: Option<String>,
}

// -------------------------
// Permissions per command
// -------------------------

static ORDERS_CREATE: [Permission; 1] = [Permission::ORDERS_CREATE];
static ORDERS_EDIT: [Permission; 1] = [Permission::ORDERS_EDIT];
static ORDERS_CANCEL: [Permission; 1] = [Permission::ORDERS_CANCEL];
static INVOICES_ISSUE: [Permission; 1] = [Permission::INVOICES_ISSUE];
static PAYMENTS_VERIFY: [Permission; 1] = [Permission::PAYMENTS_VERIFY];
static INVOICES_OVERPAID: [Permission; 1] = [Permission::INVOICES_OVERPAID];
static CATALOG_MANAGE: [Permission; 1] = [Permission::CATALOG_MANAGE];
static RULES_MANAGE: [Permission; 1] = [Permission::RULES_MANAGE];

macro_rules! requires {
    ($dto:ty => $perms:ident) => {
        impl CommandAuthorization for $dto {
            fn required_permissions(&self) -> &[Permission] {
                &$perms
            }
        }
    };
}

requires!(CreateOrderRequest => ORDERS_CREATE);
requires!(UpdateOrderRequest => ORDERS_EDIT);
requires!(CancelOrderRequest => ORDERS_CANCEL);
requires!(IssueInvoiceRequest => INVOICES_ISSUE);
requires!(VerifyPaymentRequest => PAYMENTS_VERIFY);
requires!(ResolveOverpaidRequest => INVOICES_OVERPAID);
requires!(CreateProductRequest => CATALOG_MANAGE);
requires!(CreatePriceRequest => CATALOG_MANAGE);
requires!(UpdateRulesRequest => RULES_MANAGE);

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: AggregateId,
    pub order_number: String,
    pub owner_id: Option<OwnerId>,
    pub branch_id: Option<BranchId>,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: u64,
    pub penalty_amount: u64,
    pub total_amount: u64,
    pub total_jamaah: u64,
    pub notes: Option<String>,
    pub invoice_id: Option<AggregateId>,
    pub placed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        let totals = order.totals();
        Self {
            id: order.id_typed().0,
            order_number: order.order_number().to_string(),
            owner_id: order.owner_id(),
            branch_id: order.branch_id(),
            status: order.status(),
            items: order.items().to_vec(),
            subtotal: totals.subtotal,
            penalty_amount: totals.penalty_amount,
            total_amount: totals.total_amount,
            total_jamaah: totals.total_jamaah,
            notes: order.notes().map(str::to_string),
            invoice_id: order.invoice_id(),
            placed_at: order.placed_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    pub id: AggregateId,
    pub invoice_number: String,
    pub order_id: Option<AggregateId>,
    pub owner_id: Option<OwnerId>,
    pub branch_id: Option<BranchId>,
    pub status: InvoiceStatus,
    pub total_amount: u64,
    pub dp_percentage: u8,
    pub dp_amount: u64,
    pub paid_amount: u64,
    pub remaining_amount: u64,
    pub overpaid_amount: u64,
    pub overpaid_handling: Option<OverpaidHandling>,
    pub issued_at: DateTime<Utc>,
    pub due_date_dp: DateTime<Utc>,
    pub auto_cancel_at: DateTime<Utc>,
    pub is_blocked: bool,
    pub unblocked_at: Option<DateTime<Utc>>,
    pub payment_proofs: Vec<PaymentProof>,
}

impl From<&Invoice> for InvoiceView {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id_typed().0,
            invoice_number: invoice.invoice_number().to_string(),
            order_id: invoice.order_id().map(|o| o.0),
            owner_id: invoice.owner_id(),
            branch_id: invoice.branch_id(),
            status: invoice.status(),
            total_amount: invoice.total_amount(),
            dp_percentage: invoice.dp_percentage(),
            dp_amount: invoice.dp_amount(),
            paid_amount: invoice.paid_amount(),
            remaining_amount: invoice.remaining_amount(),
            overpaid_amount: invoice.overpaid_amount(),
            overpaid_handling: invoice.overpaid_handling(),
            issued_at: invoice.issued_at(),
            due_date_dp: invoice.due_date_dp(),
            auto_cancel_at: invoice.auto_cancel_at(),
            is_blocked: invoice.is_blocked(),
            unblocked_at: invoice.unblocked_at(),
            payment_proofs: invoice.proofs().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPlacementView {
    pub order: OrderView,
    pub invoice: Option<InvoiceView>,
}

impl From<&OrderPlacement> for OrderPlacementView {
    fn from(p: &OrderPlacement) -> Self {
        Self {
            order: OrderView::from(&p.order),
            invoice: p.invoice.as_ref().map(InvoiceView::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProofReceipt {
    pub payment_proof: PaymentProof,
    pub invoice: InvoiceView,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverpaymentView {
    pub source: InvoiceView,
    pub target: Option<InvoiceView>,
}

// -------------------------
// Parsing helpers
// -------------------------

/// Parse an optional query/body id; `Err` carries the offending field name.
pub fn parse_opt<T: core::str::FromStr>(field: &'static str, raw: Option<&str>) -> Result<Option<T>, &'static str> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|_| field))
        .transpose()
}

/// Parse a snake_case enum given as plain text (multipart fields).
pub fn parse_text_enum<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_ascii_lowercase())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use umrahops_invoicing::{PaymentLocation, PaymentType};

    #[test]
    fn overpaid_target_follows_handling() {
        let req: ResolveOverpaidRequest = serde_json::from_value(serde_json::json!({
            "handling": "transfer_order",
            "target_invoice_id": "ignored",
            "target_order_id": "the-order",
        }))
        .unwrap();
        assert_eq!(req.target(), Some("the-order"));

        let req: ResolveOverpaidRequest = serde_json::from_value(serde_json::json!({ "handling": "refund" })).unwrap();
        assert_eq!(req.target(), None);
    }

    #[test]
    fn create_order_defaults() {
        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "items": [{ "item_type": "bus", "quantity": 40, "unit_price": 100000 }]
        }))
        .unwrap();
        assert!(!req.draft);
        assert!(!req.is_super_promo);
        assert_eq!(req.items[0].unit_price, Some(100_000));
        assert_eq!(req.items[0].product_id, None);
    }

    #[test]
    fn rule_values_keep_json_form() {
        assert_eq!(rule_value_text(&serde_json::json!("48")), "48");
        assert_eq!(rule_value_text(&serde_json::json!(40)), "40");
        assert_eq!(rule_value_text(&serde_json::json!(true)), "true");
        assert_eq!(rule_value_text(&serde_json::json!({"SAR": 4300})), r#"{"SAR":4300}"#);
    }

    #[test]
    fn ids_and_text_enums_parse() {
        assert_eq!(parse_opt::<BranchId>("branch_id", None), Ok(None));
        assert_eq!(parse_opt::<BranchId>("branch_id", Some("  ")), Ok(None));
        assert_eq!(parse_opt::<BranchId>("branch_id", Some("nope")), Err("branch_id"));

        assert_eq!(parse_text_enum::<PaymentLocation>("Saudi"), Some(PaymentLocation::Saudi));
        assert_eq!(parse_text_enum::<PaymentType>("dp"), Some(PaymentType::Dp));
        assert_eq!(parse_text_enum::<PaymentType>("cash"), None);
    }
}
