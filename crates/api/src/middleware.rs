use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use umrahops_auth::{JwtValidator, Principal};

use crate::app::errors;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Bearer token → [`PrincipalContext`]. Rejects with 401 before any handler runs.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(message) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message),
    };

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "invalid or expired token");
        }
    };

    req.extensions_mut()
        .insert(PrincipalContext::new(Principal::from(claims)));

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing authorization header")?;

    let header = header.to_str().map_err(|_| "malformed authorization header")?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or("authorization header must use the Bearer scheme")?
        .trim();
    if token.is_empty() {
        return Err("empty bearer token");
    }

    Ok(token)
}
