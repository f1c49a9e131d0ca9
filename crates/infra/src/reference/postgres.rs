//! Postgres-backed catalog and rule stores.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use umrahops_catalog::{Currency, PriceId, Product, ProductId, ProductKind, ProductPrice};
use umrahops_core::{BranchId, DomainError, OwnerId};
use umrahops_rules::{RuleEntry, RuleKey};

use super::{CatalogStore, RuleStore, StoreError};
use crate::pg::block_on;

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::Domain(DomainError::NotFound),
                _ => StoreError::Backend(msg),
            }
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn run<T>(fut: impl std::future::Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    block_on(fut).map_err(StoreError::Backend)?
}

fn decode(e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {e}"))
}

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let kind: String = row.try_get("kind").map_err(decode)?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id").map_err(decode)?),
        code: row.try_get("code").map_err(decode)?,
        name: row.try_get("name").map_err(decode)?,
        kind: kind.parse::<ProductKind>()?,
        active: row.try_get("active").map_err(decode)?,
    })
}

fn price_from_row(row: &PgRow) -> Result<ProductPrice, StoreError> {
    let currency: String = row.try_get("currency").map_err(decode)?;
    let branch_id: Option<Uuid> = row.try_get("branch_id").map_err(decode)?;
    let owner_id: Option<Uuid> = row.try_get("owner_id").map_err(decode)?;
    let amount: Decimal = row.try_get("amount").map_err(decode)?;
    let effective_from: Option<NaiveDate> = row.try_get("effective_from").map_err(decode)?;
    let effective_until: Option<NaiveDate> = row.try_get("effective_until").map_err(decode)?;
    Ok(ProductPrice {
        id: PriceId::from_uuid(row.try_get("id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        branch_id: branch_id.map(BranchId::from_uuid),
        owner_id: owner_id.map(OwnerId::from_uuid),
        currency: currency.parse::<Currency>()?,
        amount,
        effective_from,
        effective_until,
    })
}

impl CatalogStore for PostgresCatalogStore {
    fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        run(async {
            sqlx::query("INSERT INTO products (id, code, name, kind, active) VALUES ($1, $2, $3, $4, $5)")
                .bind(product.id.as_uuid())
                .bind(&product.code)
                .bind(&product.name)
                .bind(product.kind.as_str())
                .bind(product.active)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("insert_product", e))?;
            Ok(product)
        })
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        run(async {
            let row = sqlx::query("SELECT id, code, name, kind, active FROM products WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("product", e))?;
            row.as_ref().map(product_from_row).transpose()
        })
    }

    fn products(&self) -> Result<Vec<Product>, StoreError> {
        run(async {
            let rows = sqlx::query("SELECT id, code, name, kind, active FROM products ORDER BY code")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("products", e))?;
            rows.iter().map(product_from_row).collect()
        })
    }

    fn insert_price(&self, price: ProductPrice) -> Result<ProductPrice, StoreError> {
        price.validate()?;
        run(async {
            sqlx::query(
                r#"
                INSERT INTO product_prices
                    (id, product_id, branch_id, owner_id, currency, amount, effective_from, effective_until)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(price.id.as_uuid())
            .bind(price.product_id.as_uuid())
            .bind(price.branch_id.map(Uuid::from))
            .bind(price.owner_id.map(Uuid::from))
            .bind(price.currency.as_str())
            .bind(price.amount)
            .bind(price.effective_from)
            .bind(price.effective_until)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_price", e))?;
            Ok(price)
        })
    }

    fn prices_for(&self, product_id: ProductId) -> Result<Vec<ProductPrice>, StoreError> {
        run(async {
            let rows = sqlx::query(
                r#"
                SELECT id, product_id, branch_id, owner_id, currency, amount, effective_from, effective_until
                FROM product_prices
                WHERE product_id = $1
                "#,
            )
            .bind(product_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("prices_for", e))?;
            rows.iter().map(price_from_row).collect()
        })
    }
}

#[derive(Debug, Clone)]
pub struct PostgresRuleStore {
    pool: Arc<PgPool>,
}

impl PostgresRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

impl RuleStore for PostgresRuleStore {
    fn entries(&self, branch_id: Option<BranchId>) -> Result<Vec<RuleEntry>, StoreError> {
        run(async {
            let rows = sqlx::query(
                r#"
                SELECT branch_id, key, value, updated_at
                FROM business_rules
                WHERE branch_id IS NOT DISTINCT FROM $1
                "#,
            )
            .bind(branch_id.map(Uuid::from))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rule_entries", e))?;

            let mut entries = Vec::with_capacity(rows.len());
            for row in &rows {
                let key: String = row.try_get("key").map_err(decode)?;
                // Keys from a newer release are skipped.
                let Ok(key) = key.parse::<RuleKey>() else {
                    continue;
                };
                let branch: Option<Uuid> = row.try_get("branch_id").map_err(decode)?;
                let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;
                entries.push(RuleEntry {
                    branch_id: branch.map(BranchId::from_uuid),
                    key,
                    value: row.try_get("value").map_err(decode)?,
                    updated_at,
                });
            }
            Ok(entries)
        })
    }

    fn upsert(&self, entry: RuleEntry) -> Result<(), StoreError> {
        run(async {
            sqlx::query(
                r#"
                INSERT INTO business_rules (branch_id, key, value, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (COALESCE(branch_id, '00000000-0000-0000-0000-000000000000'::uuid), key)
                DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(entry.branch_id.map(Uuid::from))
            .bind(entry.key.as_str())
            .bind(&entry.value)
            .bind(entry.updated_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_rule", e))?;
            Ok(())
        })
    }
}
