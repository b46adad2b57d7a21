use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Local;

use labloan_borrowing::{BorrowStatus, RequestFilter};
use labloan_core::BorrowRequestId;
use labloan_infra::ServiceError;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/alerts", get(due_alerts))
        .route("/:id", put(update_status))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateBorrowRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let draft = match body.into_draft() {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match services.create_request(draft).await {
        Ok(request) => (StatusCode::CREATED, Json(dto::request_to_json(&request))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::RequestListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<BorrowStatus>() {
            Ok(s) => Some(s),
            Err(e) => return errors::service_error_to_response(e.into()),
        },
        None => None,
    };
    let filter = RequestFilter {
        requester: query.student_name.filter(|s| !s.is_empty()),
        status,
    };

    match services.list_requests(&filter).await {
        Ok(views) => {
            let body: Vec<_> = views.iter().map(dto::view_to_json).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateStatusRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let target = match body.target() {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    // An id that cannot name a request is answered like a missing request.
    let id = match id.parse::<BorrowRequestId>() {
        Ok(id) => id,
        Err(_) => {
            return errors::transition_error_to_response(ServiceError::NotFound(format!(
                "borrow request {id}"
            )));
        }
    };

    match services.transition(id, target).await {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Status updated successfully",
                "request": dto::request_to_json(&committed.request),
            })),
        )
            .into_response(),
        Err(e) => errors::transition_error_to_response(e),
    }
}

/// Advisory lines for approved requests; one requester's when `studentName` is given.
pub async fn due_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::AlertsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };

    let today = match dto::parse_optional_date(query.today.as_deref(), "today") {
        Ok(Some(d)) => d,
        Ok(None) => Local::now().date_naive(),
        Err(resp) => return resp,
    };
    let requester = query.student_name.filter(|s| !s.is_empty());

    match services.due_alerts(today, requester).await {
        Ok(alerts) => {
            let body: Vec<_> = alerts.iter().map(dto::alert_to_json).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}
