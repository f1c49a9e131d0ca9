use axum::{response::Response, routing::get, Router};

use umrahops_core::AggregateId;

use crate::app::errors;

pub mod accounting;
pub mod catalog;
pub mod invoices;
pub mod orders;
pub mod rules;
pub mod system;

/// Handlers answer with the success envelope or an already-mapped error.
pub type ApiResult = Result<Response, Response>;

pub(crate) fn parse_id(raw: &str, field: &str) -> Result<AggregateId, Response> {
    raw.parse().map_err(|_| errors::invalid_id(field))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/orders", orders::router())
        .nest("/invoices", invoices::router())
        .nest("/accounting", accounting::router())
        .nest("/catalog", catalog::router())
        .nest("/rules", rules::router())
}
