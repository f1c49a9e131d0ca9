//! Postgres wiring shared by the event store and the reference-data stores.

use std::future::Future;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const INIT_SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Drive an async query from the synchronous store traits.
///
/// Requires a multi-threaded tokio runtime: the current worker is handed
/// over to the blocking section instead of stalling the reactor.
pub(crate) fn block_on<F: Future>(fut: F) -> Result<F::Output, String> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|_| "postgres stores must be called from within a tokio runtime".to_string())?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

/// Open a pool and apply the schema (idempotent DDL).
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    sqlx::raw_sql(INIT_SCHEMA).execute(&pool).await?;
    info!("postgres schema applied");
    Ok(pool)
}
