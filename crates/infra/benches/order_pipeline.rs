use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use umrahops_core::{OwnerId, UserId};
use umrahops_events::{EventEnvelope, InMemoryEventBus};
use umrahops_infra::command_dispatcher::CommandDispatcher;
use umrahops_infra::event_store::{EventStore, InMemoryEventStore};
use umrahops_infra::external::TracingNotifier;
use umrahops_infra::projections::invoices_projection;
use umrahops_infra::reference::{InMemoryCatalogStore, InMemoryRuleStore};
use umrahops_infra::workflows::{Backoffice, LineRequest, NewOrder, ProofSubmission};
use umrahops_invoicing::{PaymentLocation, PaymentType};
use umrahops_orders::{ItemMeta, ItemType};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn setup() -> (Backoffice<Arc<InMemoryEventStore>, Bus>, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let office = Backoffice::new(
        CommandDispatcher::new(store.clone(), bus),
        Arc::new(InMemoryCatalogStore::new()),
        Arc::new(InMemoryRuleStore::new()),
        Arc::new(TracingNotifier),
    );
    (office, store)
}

fn order_request(branch: &str) -> NewOrder {
    let mut hotel = LineRequest {
        item_type: ItemType::Hotel,
        product_id: None,
        quantity: 10,
        unit_price: Some(2_500_000),
        meta: ItemMeta::default(),
    };
    hotel.meta.room_type = Some("quad".to_string());
    let bus = LineRequest {
        item_type: ItemType::Bus,
        product_id: None,
        quantity: 40,
        unit_price: Some(150_000),
        meta: ItemMeta::default(),
    };
    NewOrder {
        owner_id: OwnerId::new(),
        requested_branch: Some(branch.to_string()),
        profile_branch: None,
        default_branch: None,
        items: vec![hotel, bus],
        notes: None,
        draft: false,
        super_promo: false,
        placed_by: UserId::new(),
    }
}

fn bench_order_to_invoice(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_to_invoice");
    let branch = uuid::Uuid::now_v7().to_string();

    group.bench_function("create_order_with_invoice", |b| {
        let (office, _) = setup();
        b.iter(|| {
            office
                .create_order(black_box(order_request(&branch)), Utc::now())
                .unwrap();
        });
    });

    group.bench_function("submit_and_verify_payment", |b| {
        let (office, _) = setup();
        let invoice = office
            .create_order(order_request(&branch), Utc::now())
            .unwrap()
            .invoice
            .unwrap();
        let invoice_id = invoice.id_typed().0;
        b.iter(|| {
            let (_, proof_id) = office
                .submit_payment_proof(
                    invoice_id,
                    ProofSubmission {
                        payment_type: PaymentType::Partial,
                        amount: black_box(1_000),
                        location: PaymentLocation::Saudi,
                        proof_file_url: None,
                        submitted_by: UserId::new(),
                    },
                    Utc::now(),
                )
                .unwrap();
            office
                .verify_payment(invoice_id, proof_id, true, None, UserId::new(), Utc::now())
                .unwrap();
        });
    });

    group.finish();
}

fn bench_invoice_projection_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_projection_rebuild");
    let branch = uuid::Uuid::now_v7().to_string();

    for orders in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("rebuild_from_store", orders), &orders, |b, &count| {
            let (office, store) = setup();
            for _ in 0..count {
                office.create_order(order_request(&branch), Utc::now()).unwrap();
            }
            let events = store.load_all("invoicing.invoice").unwrap();
            b.iter(|| {
                let projection = invoices_projection();
                black_box(projection.rebuild(&events).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_order_to_invoice, bench_invoice_projection_rebuild);
criterion_main!(benches);
