use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use umrahops_core::BranchId;
use umrahops_infra::command_dispatcher::DispatchError;
use umrahops_infra::reference::effective_rules;
use umrahops_rules::{BusinessRules, EffectiveRule, RuleEntry, RuleKey};

use crate::app::{dto, errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

use super::ApiResult;

pub fn router() -> Router {
    Router::new().route("/", get(get_rules).put(put_rules))
}

#[derive(Debug, Serialize)]
struct RulesView {
    branch_id: Option<BranchId>,
    /// Every key with its value and where it came from.
    rules: Vec<EffectiveRule>,
    effective: BusinessRules,
}

fn rules_view(services: &AppServices, branch_id: Option<BranchId>) -> Result<RulesView, DispatchError> {
    Ok(RulesView {
        branch_id,
        rules: effective_rules(services.office.rules(), branch_id)?,
        effective: services.office.business_rules(branch_id)?,
    })
}

pub async fn get_rules(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::RulesQuery>,
) -> ApiResult {
    let branch_id = dto::parse_opt::<BranchId>("branch_id", query.branch_id.as_deref()).map_err(errors::invalid_id)?;
    let view = rules_view(&services, branch_id).map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok(StatusCode::OK, view))
}

/// Every value is validated before any row is written.
pub async fn put_rules(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::UpdateRulesRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    if body.rules.is_empty() {
        return Err(errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "rules cannot be empty"));
    }

    let now = Utc::now();
    let entries = body
        .rules
        .iter()
        .map(|(key, value)| {
            let key: RuleKey = key.parse()?;
            RuleEntry::new(body.branch_id, key, dto::rule_value_text(value), now)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| errors::dispatch_error_to_response(e.into()))?;

    for entry in entries {
        info!(branch_id = ?entry.branch_id, key = %entry.key, value = %entry.value, "business rule updated");
        services
            .office
            .rules()
            .upsert(entry)
            .map_err(|e| errors::dispatch_error_to_response(e.into()))?;
    }

    let view = rules_view(&services, body.branch_id).map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok_with_message(StatusCode::OK, view, "rules updated"))
}
