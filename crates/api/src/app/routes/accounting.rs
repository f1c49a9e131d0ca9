use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
    Router,
};
use chrono::Utc;

use umrahops_accounting::AgingFilter;
use umrahops_auth::{AuthzError, Permission, ReadScope};
use umrahops_core::{BranchId, OwnerId};
use umrahops_infra::projections::aging_report;

use crate::app::{dto, errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

use super::ApiResult;

pub fn router() -> Router {
    Router::new().route("/aging", get(aging))
}

/// Receivables aging over the invoice projection. Branch staff always get
/// their own branch.
pub async fn aging(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::AgingQuery>,
) -> ApiResult {
    authz::require(&principal, &Permission::REPORTS_AGING).map_err(errors::authz_error_to_response)?;
    let mut filter = AgingFilter {
        branch_id: dto::parse_opt::<BranchId>("branch_id", query.branch_id.as_deref()).map_err(errors::invalid_id)?,
        owner_id: dto::parse_opt::<OwnerId>("owner_id", query.owner_id.as_deref()).map_err(errors::invalid_id)?,
        issued_from: query.issued_from,
        issued_to: query.issued_to,
    };

    match principal.read_scope() {
        ReadScope::All => {}
        ReadScope::Branch(own) => match filter.branch_id {
            Some(other) if other != own => return Err(errors::authz_error_to_response(AuthzError::OutOfScope)),
            _ => filter.branch_id = Some(own),
        },
        ReadScope::Owner(_) | ReadScope::Nothing => {
            return Err(errors::authz_error_to_response(AuthzError::OutOfScope));
        }
    }

    let report = aging_report(&services.invoices, &filter, Utc::now());
    Ok(errors::ok(StatusCode::OK, report))
}
