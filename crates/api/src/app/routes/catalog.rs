use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use umrahops_catalog::{Currency, PriceId, Product, ProductId, ProductPrice};
use umrahops_core::{BranchId, OwnerId};
use umrahops_infra::command_dispatcher::DispatchError;

use crate::app::{dto, errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

use super::ApiResult;

pub fn router() -> Router {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/prices", post(create_price))
        .route("/prices/resolve", get(resolve_price))
}

fn store_error(e: impl Into<DispatchError>) -> axum::response::Response {
    errors::dispatch_error_to_response(e.into())
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let product = Product::new(body.code, body.name, body.kind).map_err(store_error)?;
    let product = services.office.catalog().insert_product(product).map_err(store_error)?;
    Ok(errors::ok(StatusCode::CREATED, product))
}

pub async fn list_products(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let products = services.office.catalog().products().map_err(store_error)?;
    Ok(errors::ok(StatusCode::OK, products))
}

pub async fn create_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePriceRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let product_id: ProductId = body.product_id.parse().map_err(|_| errors::invalid_id("product_id"))?;

    let catalog = services.office.catalog();
    catalog
        .product(product_id)
        .map_err(store_error)?
        .ok_or_else(|| store_error(DispatchError::NotFound))?;

    let price = ProductPrice {
        id: PriceId::new(),
        product_id,
        branch_id: body.branch_id,
        owner_id: body.owner_id,
        currency: body.currency,
        amount: body.amount,
        effective_from: body.effective_from,
        effective_until: body.effective_until,
    };
    let price = catalog.insert_price(price).map_err(store_error)?;
    Ok(errors::ok(StatusCode::CREATED, price))
}

/// Owners always resolve for themselves; `date` defaults to today (UTC).
pub async fn resolve_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ResolvePriceQuery>,
) -> ApiResult {
    let product_id: ProductId = query.product_id.parse().map_err(|_| errors::invalid_id("product_id"))?;
    let branch_id = dto::parse_opt::<BranchId>("branch_id", query.branch_id.as_deref())
        .map_err(errors::invalid_id)?
        .or(principal.branch_id());
    let owner_id = match principal.owner_id() {
        Some(own) => Some(own),
        None => dto::parse_opt::<OwnerId>("owner_id", query.owner_id.as_deref()).map_err(errors::invalid_id)?,
    };
    let currency = match query.currency.as_deref() {
        Some(raw) => Some(raw.parse::<Currency>().map_err(store_error)?),
        None => None,
    };
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());

    let quote = services
        .office
        .quote_price(product_id, branch_id, owner_id, currency, today)
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok(StatusCode::OK, quote))
}
