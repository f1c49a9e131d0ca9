//! End-to-end workflow tests on the in-memory stack.
//!
//! Command → unit of work → EventStore → EventBus → projections.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use umrahops_catalog::{Currency, PriceId, Product, ProductKind, ProductPrice};
use umrahops_core::{BranchId, OwnerId, UserId};
use umrahops_events::{EventEnvelope, InMemoryEventBus};
use umrahops_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use umrahops_infra::event_store::{EventStore, InMemoryEventStore};
use umrahops_infra::external::{InMemoryNotifier, NotificationKind};
use umrahops_infra::projections::{aging_report, block_candidates, invoices_projection, orders_projection};
use umrahops_infra::reference::{CatalogStore, InMemoryCatalogStore, InMemoryRuleStore, RuleStore};
use umrahops_infra::workers::ProjectionWorker;
use umrahops_infra::workflows::{Backoffice, LineRequest, NewOrder, OrderChanges, ProofSubmission};
use umrahops_accounting::AgingFilter;
use umrahops_invoicing::{Invoice, InvoiceStatus, OverpaidHandling, PaymentLocation, PaymentType, ProofId};
use umrahops_orders::{ItemMeta, ItemType, Order, OrderStatus};
use umrahops_rules::{RuleEntry, RuleKey};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

struct Harness {
    office: Backoffice<Arc<InMemoryEventStore>, Bus>,
    store: Arc<InMemoryEventStore>,
    bus: Bus,
    catalog: Arc<InMemoryCatalogStore>,
    rules: Arc<InMemoryRuleStore>,
    notifier: Arc<InMemoryNotifier>,
    branch: BranchId,
    owner: OwnerId,
}

fn setup() -> Harness {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let catalog = Arc::new(InMemoryCatalogStore::new());
    let rules = Arc::new(InMemoryRuleStore::new());
    let notifier = Arc::new(InMemoryNotifier::new());
    let office = Backoffice::new(
        CommandDispatcher::new(store.clone(), bus.clone()),
        catalog.clone(),
        rules.clone(),
        notifier.clone(),
    );
    Harness {
        office,
        store,
        bus,
        catalog,
        rules,
        notifier,
        branch: BranchId::new(),
        owner: OwnerId::new(),
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

fn line(item_type: ItemType, quantity: u32, unit_price: u64) -> LineRequest {
    LineRequest {
        item_type,
        product_id: None,
        quantity,
        unit_price: Some(unit_price),
        meta: ItemMeta::default(),
    }
}

fn quad_rooms(quantity: u32, unit_price: u64) -> LineRequest {
    let mut l = line(ItemType::Hotel, quantity, unit_price);
    l.meta.room_type = Some("quad".to_string());
    l
}

impl Harness {
    fn new_order(&self, owner: OwnerId, items: Vec<LineRequest>) -> NewOrder {
        NewOrder {
            owner_id: owner,
            requested_branch: Some(self.branch.to_string()),
            profile_branch: None,
            default_branch: None,
            items,
            notes: None,
            draft: false,
            super_promo: false,
            placed_by: UserId::new(),
        }
    }

    /// Order worth exactly 10,000,000 with its invoice.
    fn ten_million(&self) -> (Order, Invoice) {
        let placement = self
            .office
            .create_order(self.new_order(self.owner, vec![quad_rooms(1, 10_000_000)]), t0())
            .unwrap();
        (placement.order, placement.invoice.unwrap())
    }

    fn pay(&self, invoice: &Invoice, amount: u64, at: DateTime<Utc>) -> (Invoice, ProofId) {
        let id = invoice.id_typed().0;
        let (_, proof_id) = self
            .office
            .submit_payment_proof(
                id,
                ProofSubmission {
                    payment_type: PaymentType::Partial,
                    amount,
                    location: PaymentLocation::Indonesia,
                    proof_file_url: Some(format!("payment-proofs/{id}/transfer.png")),
                    submitted_by: UserId::new(),
                },
                at,
            )
            .unwrap();
        let invoice = self
            .office
            .verify_payment(id, proof_id, true, None, UserId::new(), at)
            .unwrap();
        (invoice, proof_id)
    }

    fn order(&self, order: &Order) -> Order {
        self.office.order(order.id_typed().0).unwrap()
    }
}

#[test]
fn order_and_invoice_are_created_together() {
    let h = setup();
    let placement = h
        .office
        .create_order(h.new_order(h.owner, vec![line(ItemType::Bus, 40, 100_000)]), t0())
        .unwrap();

    let order = placement.order;
    let invoice = placement.invoice.unwrap();
    assert_eq!(order.status(), OrderStatus::Tentative);
    assert_eq!(order.totals().penalty_amount, 2_500_000);
    assert_eq!(order.totals().total_amount, 6_500_000);
    assert_eq!(order.invoice_id(), Some(invoice.id_typed().0));
    assert_eq!(order.branch_id(), Some(h.branch));

    assert_eq!(invoice.total_amount(), 6_500_000);
    assert_eq!(invoice.dp_amount(), 1_950_000);
    assert_eq!(invoice.due_date_dp(), t0() + ChronoDuration::days(3));
    assert_eq!(invoice.auto_cancel_at(), t0() + ChronoDuration::hours(24));
    assert!(invoice.invoice_number().starts_with("INV-20260301-"));

    let notes = h.notifier.all();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::OrderCreated);
}

#[test]
fn failed_invoice_leaves_no_order_behind() {
    let h = setup();
    // A zero total cannot be invoiced, so the whole unit of work fails.
    let err = h
        .office
        .create_order(h.new_order(h.owner, vec![line(ItemType::Bus, 35, 0)]), t0())
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(h.store.load_all("orders.order").unwrap().is_empty());
    assert!(h.store.load_all("invoicing.invoice").unwrap().is_empty());
    assert!(h.notifier.all().is_empty());
}

#[test]
fn missing_branch_is_rejected() {
    let h = setup();
    let mut request = h.new_order(h.owner, vec![line(ItemType::Bus, 35, 100_000)]);
    request.requested_branch = None;
    let err = h.office.create_order(request, t0()).unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
}

#[test]
fn branch_rules_and_super_promo_shape_the_invoice() {
    let h = setup();
    h.rules
        .upsert(RuleEntry::new(Some(h.branch), RuleKey::BusMinPack, "40", t0()).unwrap())
        .unwrap();
    let mut request = h.new_order(h.owner, vec![line(ItemType::Bus, 40, 100_000)]);
    request.super_promo = true;

    let placement = h.office.create_order(request, t0()).unwrap();
    assert_eq!(placement.order.totals().penalty_amount, 0);
    let invoice = placement.invoice.unwrap();
    assert_eq!(invoice.dp_percentage(), 50);
    assert_eq!(invoice.dp_amount(), 2_000_000);
}

#[test]
fn catalog_prices_are_resolved_by_tier_and_converted() {
    let h = setup();
    let product = h
        .catalog
        .insert_product(Product::new("VISA-UMR", "Umrah visa", ProductKind::Visa).unwrap())
        .unwrap();
    let price = |branch: Option<BranchId>, currency: Currency, amount: rust_decimal::Decimal| ProductPrice {
        id: PriceId::new(),
        product_id: product.id,
        branch_id: branch,
        owner_id: None,
        currency,
        amount,
        effective_from: None,
        effective_until: None,
    };
    h.catalog.insert_price(price(None, Currency::Sar, dec!(100))).unwrap();

    let mut visa = line(ItemType::Visa, 2, 0);
    visa.unit_price = None;
    visa.product_id = Some(product.id);
    let mut request = h.new_order(h.owner, vec![quad_rooms(1, 1_000_000), visa]);

    let placement = h.office.create_order(request.clone(), t0()).unwrap();
    assert_eq!(placement.order.items()[1].unit_price, 425_000);

    h.catalog
        .insert_price(price(Some(h.branch), Currency::Idr, dec!(400000)))
        .unwrap();
    let placement = h.office.create_order(request.clone(), t0()).unwrap();
    assert_eq!(placement.order.items()[1].unit_price, 400_000);
    assert_eq!(placement.order.totals().total_amount, 1_800_000);

    let unpriced = h
        .catalog
        .insert_product(Product::new("TKT-CGK", "Ticket", ProductKind::Ticket).unwrap())
        .unwrap();
    request.items[1].product_id = Some(unpriced.id);
    let err = h.office.create_order(request, t0()).unwrap_err();
    assert!(matches!(err, DispatchError::PriceNotFound(id) if id == unpriced.id));
}

#[test]
fn payments_move_invoice_and_order_through_their_stages() {
    let h = setup();
    let (order, invoice) = h.ten_million();
    assert_eq!(invoice.dp_amount(), 3_000_000);

    let (invoice, _) = h.pay(&invoice, 3_000_000, t0() + ChronoDuration::hours(1));
    assert_eq!(invoice.status(), InvoiceStatus::PartialPaid);
    assert_eq!(invoice.remaining_amount(), 7_000_000);
    assert_eq!(h.order(&order).status(), OrderStatus::Confirmed);

    let (invoice, last_proof) = h.pay(&invoice, 7_000_000, t0() + ChronoDuration::hours(2));
    assert_eq!(invoice.status(), InvoiceStatus::Paid);
    assert_eq!(invoice.remaining_amount(), 0);
    assert_eq!(h.order(&order).status(), OrderStatus::Processing);

    // Reversing the last payment walks both back.
    let invoice = h
        .office
        .verify_payment(
            invoice.id_typed().0,
            last_proof,
            false,
            Some("bank mutation not found".into()),
            UserId::new(),
            t0() + ChronoDuration::hours(3),
        )
        .unwrap();
    assert_eq!(invoice.status(), InvoiceStatus::PartialPaid);
    assert_eq!(invoice.paid_amount(), 3_000_000);
    assert_eq!(h.order(&order).status(), OrderStatus::Confirmed);

    let kinds: Vec<_> = h.notifier.all().into_iter().map(|n| n.kind).collect();
    assert!(kinds.contains(&NotificationKind::PaymentVerified));
    assert!(kinds.contains(&NotificationKind::PaymentRejected));
}

#[test]
fn concurrent_verifications_on_one_invoice_both_count() {
    let h = setup();
    let (_, invoice) = h.ten_million();
    let id = invoice.id_typed().0;

    let proofs: Vec<ProofId> = (0..4)
        .map(|_| {
            h.office
                .submit_payment_proof(
                    id,
                    ProofSubmission {
                        payment_type: PaymentType::Partial,
                        amount: 1_000_000,
                        location: PaymentLocation::Saudi,
                        proof_file_url: None,
                        submitted_by: UserId::new(),
                    },
                    t0(),
                )
                .unwrap()
                .1
        })
        .collect();

    std::thread::scope(|s| {
        for proof_id in &proofs {
            let office = &h.office;
            s.spawn(move || {
                office
                    .verify_payment(id, *proof_id, true, None, UserId::new(), t0())
                    .unwrap();
            });
        }
    });

    let invoice = h.office.invoice(id, t0()).unwrap();
    assert_eq!(invoice.paid_amount(), 4_000_000);
    assert_eq!(invoice.remaining_amount(), 6_000_000);
    assert_eq!(invoice.status(), InvoiceStatus::PartialPaid);
}

#[test]
fn unpaid_invoice_blocks_on_read_after_grace_window() {
    let h = setup();
    let (order, invoice) = h.ten_million();
    let id = invoice.id_typed().0;

    let early = h.office.invoice(id, t0() + ChronoDuration::hours(23)).unwrap();
    assert!(!early.is_blocked());

    let late = t0() + ChronoDuration::hours(25);
    let blocked = h.office.invoice(id, late).unwrap();
    assert!(blocked.is_blocked());
    assert_eq!(h.order(&order).status(), OrderStatus::Blocked);
    assert!(
        h.notifier
            .all()
            .iter()
            .any(|n| n.kind == NotificationKind::InvoiceBlocked)
    );

    let err = h
        .office
        .submit_payment_proof(
            id,
            ProofSubmission {
                payment_type: PaymentType::Dp,
                amount: 3_000_000,
                location: PaymentLocation::Saudi,
                proof_file_url: None,
                submitted_by: UserId::new(),
            },
            late,
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));

    let unblocked = h.office.unblock_invoice(id, UserId::new(), late).unwrap();
    assert!(!unblocked.is_blocked());
    assert_eq!(unblocked.auto_cancel_at(), late + ChronoDuration::hours(24));
    assert_eq!(h.order(&order).status(), OrderStatus::Tentative);

    // Once unblocked, never auto-blocked again.
    let much_later = h.office.invoice(id, late + ChronoDuration::days(5)).unwrap();
    assert!(!much_later.is_blocked());
}

#[test]
fn paid_invoice_never_auto_blocks() {
    let h = setup();
    let (order, invoice) = h.ten_million();
    h.pay(&invoice, 500_000, t0() + ChronoDuration::hours(1));

    let later = h
        .office
        .invoice(invoice.id_typed().0, t0() + ChronoDuration::days(10))
        .unwrap();
    assert!(!later.is_blocked());
    assert_eq!(h.order(&order).status(), OrderStatus::Tentative);
}

#[test]
fn sweep_blocks_due_invoices_from_the_projection() {
    let h = setup();
    let invoices = invoices_projection();
    let (_, due) = h.ten_million();
    let (_, paid) = h.ten_million();
    h.pay(&paid, 100_000, t0());

    invoices
        .rebuild(&h.store.load_all("invoicing.invoice").unwrap())
        .unwrap();
    let now = t0() + ChronoDuration::days(2);
    let candidates = block_candidates(&invoices, now);
    assert_eq!(candidates, vec![due.id_typed().0]);

    assert_eq!(h.office.sweep_blocks(candidates.clone(), now).unwrap(), 1);
    assert_eq!(h.office.sweep_blocks(candidates, now).unwrap(), 0);
    assert_eq!(
        h.store
            .load_all("invoicing.invoice")
            .unwrap()
            .iter()
            .filter(|e| e.event_type == "invoicing.invoice.blocked")
            .count(),
        1
    );
}

#[test]
fn cancellation_requires_an_unpaid_invoice() {
    let h = setup();
    let (order, invoice) = h.ten_million();
    let placement = h
        .office
        .cancel_order(order.id_typed().0, Some("customer withdrew".into()), t0())
        .unwrap();
    assert_eq!(placement.order.status(), OrderStatus::Cancelled);
    assert_eq!(placement.invoice.unwrap().status(), InvoiceStatus::Canceled);
    assert_eq!(
        h.office.invoice(invoice.id_typed().0, t0()).unwrap().status(),
        InvoiceStatus::Canceled
    );

    let (order, invoice) = h.ten_million();
    h.pay(&invoice, 3_000_000, t0());
    let err = h.office.cancel_order(order.id_typed().0, None, t0()).unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));
    assert_eq!(h.order(&order).status(), OrderStatus::Confirmed);
}

#[test]
fn draft_orders_get_their_invoice_once() {
    let h = setup();
    let mut request = h.new_order(h.owner, vec![quad_rooms(2, 5_000_000)]);
    request.draft = true;
    let placement = h.office.create_order(request, t0()).unwrap();
    assert!(placement.invoice.is_none());
    assert_eq!(placement.order.status(), OrderStatus::Draft);
    let order_id = placement.order.id_typed().0;

    let issued = h.office.issue_invoice(order_id, false, t0()).unwrap();
    assert_eq!(issued.order.status(), OrderStatus::Tentative);
    let invoice = issued.invoice.unwrap();
    assert_eq!(invoice.total_amount(), 10_000_000);
    assert_eq!(issued.order.invoice_id(), Some(invoice.id_typed().0));

    let err = h.office.issue_invoice(order_id, false, t0()).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));
}

#[test]
fn editing_items_resyncs_the_invoice() {
    let h = setup();
    let (order, invoice) = h.ten_million();
    h.pay(&invoice, 3_000_000, t0());

    let placement = h
        .office
        .edit_order(
            order.id_typed().0,
            OrderChanges {
                items: Some(vec![quad_rooms(1, 3_000_000)]),
                notes: Some("downgraded".into()),
            },
            t0() + ChronoDuration::hours(2),
        )
        .unwrap();

    let invoice = placement.invoice.unwrap();
    assert_eq!(invoice.total_amount(), 3_000_000);
    assert_eq!(invoice.paid_amount(), 3_000_000);
    assert_eq!(invoice.status(), InvoiceStatus::Paid);
    assert_eq!(invoice.due_date_dp(), t0() + ChronoDuration::days(3));
    assert_eq!(placement.order.status(), OrderStatus::Processing);
    assert_eq!(placement.order.notes(), Some("downgraded"));
}

#[test]
fn overpayment_moves_to_another_order_of_the_same_owner() {
    let h = setup();
    let (_, source) = h.ten_million();
    let (target_order, target) = h.ten_million();

    let (source, _) = h.pay(&source, 12_000_000, t0());
    assert_eq!(source.status(), InvoiceStatus::Overpaid);
    assert_eq!(source.overpaid_amount(), 2_000_000);

    let outcome = h
        .office
        .resolve_overpayment(
            source.id_typed().0,
            OverpaidHandling::TransferOrder,
            Some(target_order.id_typed().0),
            UserId::new(),
            t0(),
        )
        .unwrap();
    assert_eq!(outcome.source.overpaid_amount(), 0);
    assert_eq!(outcome.source.status(), InvoiceStatus::Paid);
    let credited = outcome.target.unwrap();
    assert_eq!(credited.id_typed(), target.id_typed());
    assert_eq!(credited.paid_amount(), 2_000_000);
    assert_eq!(credited.remaining_amount(), 8_000_000);
}

#[test]
fn cross_owner_transfer_is_rejected_without_side_effects() {
    let h = setup();
    let (_, source) = h.ten_million();
    let foreign = h
        .office
        .create_order(h.new_order(OwnerId::new(), vec![quad_rooms(1, 10_000_000)]), t0())
        .unwrap()
        .invoice
        .unwrap();

    let (source, _) = h.pay(&source, 11_000_000, t0());
    let err = h
        .office
        .resolve_overpayment(
            source.id_typed().0,
            OverpaidHandling::TransferInvoice,
            Some(foreign.id_typed().0),
            UserId::new(),
            t0(),
        )
        .unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized));

    let source = h.office.invoice(source.id_typed().0, t0()).unwrap();
    assert_eq!(source.overpaid_amount(), 1_000_000);
    assert_eq!(h.office.invoice(foreign.id_typed().0, t0()).unwrap().paid_amount(), 0);
}

#[test]
fn worker_fed_projections_serve_lists_and_aging() {
    let h = setup();
    let orders = Arc::new(orders_projection());
    let invoices = Arc::new(invoices_projection());

    let (o, i) = (orders.clone(), invoices.clone());
    let worker = ProjectionWorker::spawn("test-projections", &h.bus, move |env: EventEnvelope<JsonValue>| {
        o.apply_envelope(&env)?;
        i.apply_envelope(&env)
    })
    .unwrap();

    let (order, invoice) = h.ten_million();
    h.pay(&invoice, 3_000_000, t0());
    std::thread::sleep(Duration::from_millis(300));
    worker.shutdown();

    assert_eq!(orders.get(order.id_typed().0).unwrap().status(), OrderStatus::Confirmed);
    let projected = invoices.get(invoice.id_typed().0).unwrap();
    assert_eq!(projected.paid_amount(), 3_000_000);

    let report = aging_report(&invoices, &AgingFilter::default(), t0() + ChronoDuration::days(48));
    assert_eq!(report.total_outstanding, 7_000_000);
    assert_eq!(report.days_31_60.count, 1);

    let other_branch = AgingFilter {
        branch_id: Some(BranchId::new()),
        ..AgingFilter::default()
    };
    assert_eq!(aging_report(&invoices, &other_branch, t0()).total_outstanding, 0);

    // A rebuild from the store reaches the same state.
    let rebuilt = invoices_projection();
    rebuilt
        .rebuild(&h.store.load_all("invoicing.invoice").unwrap())
        .unwrap();
    assert_eq!(rebuilt.get(invoice.id_typed().0), Some(projected));
}
