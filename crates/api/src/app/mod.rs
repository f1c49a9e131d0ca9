//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, bus, projections and background workers
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: response envelope and error mapping

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use umrahops_infra::external::storage::MAX_PROOF_BYTES;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Router plus the services behind it (kept for worker shutdown).
pub struct App {
    pub router: Router,
    pub services: Arc<services::AppServices>,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<App> {
    let jwt = Arc::new(umrahops_auth::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services(config).await?);

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_PROOF_BYTES + 64 * 1024)),
        );

    Ok(App { router, services })
}
