use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use umrahops_auth::AuthzError;
use umrahops_infra::command_dispatcher::DispatchError;
use umrahops_infra::external::StorageError;

/// `{success: true, data}`.
pub fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, axum::Json(json!({ "success": true, "data": data }))).into_response()
}

/// `{success: true, data, message}`.
pub fn ok_with_message<T: Serialize>(status: StatusCode, data: T, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": true,
            "data": data,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_state", msg),
        DispatchError::PriceNotFound(product_id) => json_error(
            StatusCode::BAD_REQUEST,
            "price_not_found",
            format!("no effective price for product {product_id}"),
        ),
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        infra @ (DispatchError::Deserialize(_)
        | DispatchError::Storage(_)
        | DispatchError::Store(_)
        | DispatchError::Publish(_)) => internal_error(&infra),
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn storage_error_to_response(err: StorageError) -> Response {
    match err {
        StorageError::Invalid(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_upload", msg),
        io @ StorageError::Io(_) => internal_error(&io),
    }
}

/// Logged in full; the body carries the detail only in debug builds.
fn internal_error(err: &dyn std::error::Error) -> Response {
    error!(error = %err, "request failed on infrastructure error");
    let message = if cfg!(debug_assertions) {
        err.to_string()
    } else {
        "internal server error".to_string()
    };
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 400 for a malformed id in a path or body field.
pub fn invalid_id(field: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use umrahops_catalog::ProductId;
    use umrahops_infra::event_store::EventStoreError;

    #[test]
    fn domain_failures_map_to_client_statuses() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::InvariantViolation("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::PriceNotFound(ProductId::new()), StatusCode::BAD_REQUEST),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Conflict("x".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn infrastructure_failures_are_500() {
        let err = DispatchError::Store(EventStoreError::Backend("connection reset".into()));
        assert_eq!(dispatch_error_to_response(err).status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = DispatchError::Storage("disk full".into());
        assert_eq!(dispatch_error_to_response(err).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_uploads_are_client_errors() {
        let err = StorageError::Invalid("unsupported file type: .exe".into());
        assert_eq!(storage_error_to_response(err).status(), StatusCode::BAD_REQUEST);
    }
}
