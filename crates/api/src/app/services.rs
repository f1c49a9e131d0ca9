//! Infrastructure wiring: stores, bus, projections, background workers.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use umrahops_core::{Aggregate, BranchId};
use umrahops_events::{EventEnvelope, InMemoryEventBus};
use umrahops_infra::command_dispatcher::CommandDispatcher;
use umrahops_infra::event_store::{EventStore, InMemoryEventStore};
use umrahops_infra::external::{LocalProofStorage, ProofStorage, TracingNotifier};
use umrahops_infra::projections::{
    InvoicesProjection, OrdersProjection, block_candidates, invoices_projection, orders_projection,
};
use umrahops_infra::reference::{CatalogStore, InMemoryCatalogStore, InMemoryRuleStore, RuleStore};
use umrahops_infra::workers::{BlockSweeper, BlockSweeperHandle, ProjectionWorker, WorkerHandle};
use umrahops_infra::workflows::Backoffice;
use umrahops_invoicing::Invoice;
use umrahops_orders::Order;

use crate::config::AppConfig;

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Back office over whichever event store the process was configured with.
pub type Office = Backoffice<Arc<dyn EventStore>, Bus>;

pub struct AppServices {
    pub office: Arc<Office>,
    pub orders: Arc<OrdersProjection>,
    pub invoices: Arc<InvoicesProjection>,
    pub proofs: Arc<dyn ProofStorage>,
    pub default_branch_id: Option<BranchId>,
    workers: Mutex<Option<BackgroundWorkers>>,
}

struct BackgroundWorkers {
    projections: WorkerHandle,
    sweeper: Option<BlockSweeperHandle>,
}

impl AppServices {
    /// Stop the projection feed and the sweeper; later calls are no-ops.
    pub fn shutdown_workers(&self) {
        let workers = match self.workers.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(workers) = workers {
            if let Some(sweeper) = workers.sweeper {
                sweeper.shutdown();
            }
            workers.projections.shutdown();
            info!("background workers stopped");
        }
    }
}

type Stores = (Arc<dyn EventStore>, Arc<dyn CatalogStore>, Arc<dyn RuleStore>);

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let (store, catalog, rules) = if config.use_persistent_stores {
        persistent_stores(config).await?
    } else {
        in_memory_stores()
    };

    let bus: Bus = Arc::new(InMemoryEventBus::new());

    // Rebuild before subscribing: envelopes already folded are skipped by cursor.
    let orders = Arc::new(orders_projection());
    let invoices = Arc::new(invoices_projection());
    let replayed_orders = orders
        .rebuild(&store.load_all(Order::AGGREGATE_TYPE)?)
        .context("rebuilding order projection")?;
    let replayed_invoices = invoices
        .rebuild(&store.load_all(Invoice::AGGREGATE_TYPE)?)
        .context("rebuilding invoice projection")?;
    info!(replayed_orders, replayed_invoices, "projections rebuilt");

    let projections = {
        let orders = orders.clone();
        let invoices = invoices.clone();
        ProjectionWorker::spawn("projection-worker", bus.as_ref(), move |env: EventEnvelope<JsonValue>| {
            orders.apply_envelope(&env)?;
            invoices.apply_envelope(&env)
        })?
    };

    let office = Arc::new(Backoffice::new(
        CommandDispatcher::new(store, bus),
        catalog,
        rules,
        Arc::new(TracingNotifier),
    ));

    let sweeper = match config.block_sweep_interval {
        Some(interval) => {
            let office = office.clone();
            let invoices = invoices.clone();
            let handle = BlockSweeper::with_interval(interval).spawn(
                "block-sweeper",
                Some(tokio::runtime::Handle::current()),
                move || {
                    let now = Utc::now();
                    office.sweep_blocks(block_candidates(&invoices, now), now)
                },
            )?;
            Some(handle)
        }
        None => {
            info!("block sweeper disabled; invoices auto-block on read only");
            None
        }
    };

    Ok(AppServices {
        office,
        orders,
        invoices,
        proofs: Arc::new(LocalProofStorage::new(config.uploads_root.clone())),
        default_branch_id: config.default_branch_id,
        workers: Mutex::new(Some(BackgroundWorkers { projections, sweeper })),
    })
}

fn in_memory_stores() -> Stores {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new());
    let rules: Arc<dyn RuleStore> = Arc::new(InMemoryRuleStore::new());
    (store, catalog, rules)
}

#[cfg(feature = "postgres")]
async fn persistent_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    use umrahops_infra::event_store::PostgresEventStore;
    use umrahops_infra::reference::{PostgresCatalogStore, PostgresRuleStore};

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for persistent stores")?;
    let pool = umrahops_infra::pg::connect(url).await?;
    info!("using postgres stores");
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool.clone()));
    let catalog: Arc<dyn CatalogStore> = Arc::new(PostgresCatalogStore::new(pool.clone()));
    let rules: Arc<dyn RuleStore> = Arc::new(PostgresRuleStore::new(pool));
    Ok((store, catalog, rules))
}

#[cfg(not(feature = "postgres"))]
async fn persistent_stores(_config: &AppConfig) -> anyhow::Result<Stores> {
    tracing::warn!("USE_PERSISTENT_STORES=true but the postgres feature is not enabled, falling back to in-memory");
    Ok(in_memory_stores())
}
