use axum::{extract::Extension, http::StatusCode, response::Response};
use serde_json::json;

use umrahops_auth::permissions_for_roles;

use crate::app::errors;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Response {
    let permissions: Vec<String> = permissions_for_roles(principal.roles())
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();
    errors::ok(
        StatusCode::OK,
        json!({
            "user_id": principal.user_id(),
            "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            "branch_id": principal.branch_id(),
            "owner_id": principal.owner_id(),
            "read_scope": principal.read_scope(),
            "permissions": permissions,
        }),
    )
}
