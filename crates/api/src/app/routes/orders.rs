use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;

use umrahops_auth::{AuthzError, Permission, ReadScope, Role};
use umrahops_core::{AggregateId, BranchId, OwnerId};
use umrahops_infra::workflows::{NewOrder, OrderChanges};
use umrahops_orders::Order;

use crate::app::{dto, errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

use super::{ApiResult, parse_id};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).patch(update_order))
        .route("/:id/cancel", patch(cancel_order))
        .route("/:id/complete", patch(complete_order))
}

/// Owners order for themselves; staff name the owner in the body.
fn ordering_owner(principal: &PrincipalContext, requested: Option<&str>) -> Result<OwnerId, Response> {
    let requested = dto::parse_opt::<OwnerId>("owner_id", requested).map_err(errors::invalid_id)?;
    if principal.principal().has_role(&Role::OWNER) {
        let own = principal
            .owner_id()
            .ok_or_else(|| errors::authz_error_to_response(AuthzError::OutOfScope))?;
        return match requested {
            Some(other) if other != own => Err(errors::authz_error_to_response(AuthzError::OutOfScope)),
            _ => Ok(own),
        };
    }
    requested.ok_or_else(|| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "owner_id is required"))
}

/// Load an order the caller may see; out-of-scope orders are 403.
pub(super) fn scoped_order(
    services: &AppServices,
    principal: &PrincipalContext,
    order_id: AggregateId,
) -> Result<Order, Response> {
    let order = services
        .office
        .order(order_id)
        .map_err(errors::dispatch_error_to_response)?;
    authz::require_scope(principal, order.branch_id(), order.owner_id()).map_err(errors::authz_error_to_response)?;
    Ok(order)
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let owner_id = ordering_owner(&principal, body.owner_id.as_deref())?;

    // Branch staff cannot place orders into another branch.
    if let ReadScope::Branch(own) = principal.read_scope() {
        if let Ok(Some(requested)) = dto::parse_opt::<BranchId>("branch_id", body.branch_id.as_deref()) {
            if requested != own {
                return Err(errors::authz_error_to_response(AuthzError::OutOfScope));
            }
        }
    }

    let request = NewOrder {
        owner_id,
        requested_branch: body.branch_id,
        profile_branch: principal.branch_id(),
        default_branch: principal
            .principal()
            .is_head_office()
            .then_some(services.default_branch_id)
            .flatten(),
        items: body.items,
        notes: body.notes,
        draft: body.draft,
        super_promo: body.is_super_promo,
        placed_by: principal.user_id(),
    };

    let placement = services
        .office
        .create_order(request, Utc::now())
        .map_err(errors::dispatch_error_to_response)?;

    let message = match &placement.invoice {
        Some(invoice) => format!("order created with invoice {}", invoice.invoice_number()),
        None => "draft order created".to_string(),
    };
    Ok(errors::ok_with_message(
        StatusCode::CREATED,
        dto::OrderPlacementView::from(&placement),
        message,
    ))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListOrdersQuery>,
) -> ApiResult {
    authz::require(&principal, &Permission::ORDERS_READ).map_err(errors::authz_error_to_response)?;
    let branch = dto::parse_opt::<BranchId>("branch_id", query.branch_id.as_deref()).map_err(errors::invalid_id)?;
    let owner = dto::parse_opt::<OwnerId>("owner_id", query.owner_id.as_deref()).map_err(errors::invalid_id)?;

    let scope = principal.read_scope();
    let mut orders: Vec<dto::OrderView> = services
        .orders
        .list()
        .iter()
        .filter(|o| match (o.branch_id(), o.owner_id()) {
            (Some(b), Some(ow)) => scope.allows(b, ow),
            _ => false,
        })
        .filter(|o| query.status.is_none_or(|s| o.status() == s))
        .filter(|o| branch.is_none_or(|b| o.branch_id() == Some(b)))
        .filter(|o| owner.is_none_or(|ow| o.owner_id() == Some(ow)))
        .map(dto::OrderView::from)
        .collect();
    orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));

    Ok(errors::ok(StatusCode::OK, orders))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::ORDERS_READ).map_err(errors::authz_error_to_response)?;
    let order_id = parse_id(&id, "order id")?;
    let order = scoped_order(&services, &principal, order_id)?;
    Ok(errors::ok(StatusCode::OK, dto::OrderView::from(&order)))
}

pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateOrderRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let order_id = parse_id(&id, "order id")?;
    scoped_order(&services, &principal, order_id)?;

    let changes = OrderChanges {
        items: body.items,
        notes: body.notes,
    };
    let placement = services
        .office
        .edit_order(order_id, changes, Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok(StatusCode::OK, dto::OrderPlacementView::from(&placement)))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CancelOrderRequest>>,
) -> ApiResult {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let order_id = parse_id(&id, "order id")?;
    scoped_order(&services, &principal, order_id)?;

    let placement = services
        .office
        .cancel_order(order_id, body.reason, Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok_with_message(
        StatusCode::OK,
        dto::OrderPlacementView::from(&placement),
        "order cancelled",
    ))
}

pub async fn complete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::ORDERS_COMPLETE).map_err(errors::authz_error_to_response)?;
    let order_id = parse_id(&id, "order id")?;

    let order = services
        .office
        .complete_order(order_id, Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok(StatusCode::OK, dto::OrderView::from(&order)))
}
