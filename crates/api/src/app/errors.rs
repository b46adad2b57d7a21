use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use labloan_infra::ServiceError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        e @ ServiceError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", e.to_string())
        }
        ServiceError::Unauthorized => {
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid credentials")
        }
        ServiceError::Store(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

/// Status updates report every non-validation failure as 500; the code tells them apart.
pub fn transition_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::NotFound(what) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "not_found",
            format!("{what} not found"),
        ),
        ServiceError::Conflict(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "conflict", msg),
        e @ ServiceError::InvalidTransition { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invalid_transition", e.to_string())
        }
        other => service_error_to_response(other),
    }
}

/// Duplicate usernames are a client error on signup.
pub fn signup_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Conflict(msg) => json_error(StatusCode::BAD_REQUEST, "conflict", msg),
        other => service_error_to_response(other),
    }
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
}
