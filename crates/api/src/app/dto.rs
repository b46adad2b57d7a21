use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

use labloan_auth::{SignupDraft, User};
use labloan_borrowing::{BorrowDraft, BorrowRequest, BorrowRequestView, BorrowStatus, DueAlert};
use labloan_core::ItemId;
use labloan_infra::DeletedItem;
use labloan_inventory::{Item, ItemDraft};

use crate::app::errors;

type Rejection = axum::response::Response;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /items` and `PUT /items/:id`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<Value>,
    pub location: Option<String>,
    pub last_checked: Option<String>,
}

impl ItemRequest {
    pub fn into_draft(self) -> Result<ItemDraft, Rejection> {
        Ok(ItemDraft {
            name: self.name,
            category: self.category,
            quantity: parse_integer(self.quantity, "quantity")?,
            location: self.location,
            last_checked: parse_optional_date(self.last_checked.as_deref(), "lastChecked")?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBorrowRequest {
    pub item_id: Option<String>,
    pub student_name: Option<String>,
    pub due_date: Option<String>,
    pub quantity: Option<Value>,
}

impl CreateBorrowRequest {
    pub fn into_draft(self) -> Result<BorrowDraft, Rejection> {
        let item_id = match self.item_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_id::<ItemId>(raw, "itemId")?),
            None => None,
        };
        Ok(BorrowDraft {
            item_id,
            requester_name: self.student_name,
            due_date: parse_optional_date(self.due_date.as_deref(), "dueDate")?,
            quantity: parse_integer(self.quantity, "quantity")?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

impl UpdateStatusRequest {
    pub fn target(&self) -> Result<BorrowStatus, Rejection> {
        let raw = self.status.as_deref().unwrap_or_default();
        raw.parse::<BorrowStatus>().map_err(|_| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_status",
                "status must be one of: pending, approved, rejected, returned",
            )
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestListQuery {
    pub student_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsQuery {
    pub student_name: Option<String>,
    /// Overrides the server's current date (`YYYY-MM-DD`).
    pub today: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

impl From<SignupRequest> for SignupDraft {
    fn from(value: SignupRequest) -> Self {
        SignupDraft {
            username: value.username,
            password: value.password,
            name: value.name,
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, Rejection> {
    raw.parse::<T>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{field} is not a valid id"),
        )
    })
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part kept). Blank means absent.
pub fn parse_optional_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, Rejection> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.date_naive()))
        .map_err(|_| {
            errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("{field} must be a date (YYYY-MM-DD)"),
            )
        })
}

/// Integers may arrive as JSON numbers or numeric strings (form inputs).
pub fn parse_integer(raw: Option<Value>, field: &str) -> Result<Option<i64>, Rejection> {
    let invalid = || {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("{field} must be an integer"),
        )
    };
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn item_to_json(item: &Item) -> Value {
    serde_json::json!({
        "id": item.id.to_string(),
        "name": item.name,
        "category": item.category.as_str(),
        "quantity": item.quantity,
        "location": item.location,
        "lastChecked": item.last_checked.to_string(),
    })
}

pub fn deleted_item_to_json(deleted: &DeletedItem) -> Value {
    serde_json::json!({
        "message": "Item deleted successfully",
        "removedRequests": deleted.removed_requests,
    })
}

pub fn request_to_json(request: &BorrowRequest) -> Value {
    serde_json::json!({
        "id": request.id.to_string(),
        "itemId": request.item_id.to_string(),
        "studentName": request.requester_name,
        "quantity": request.quantity,
        "dueDate": request.due_date.to_string(),
        "status": request.status.as_str(),
        "requestDate": request.request_date.to_rfc3339(),
    })
}

pub fn view_to_json(view: &BorrowRequestView) -> Value {
    let mut value = request_to_json(&view.request);
    value["itemName"] = Value::String(view.item_name.clone());
    value
}

pub fn alert_to_json(alert: &DueAlert) -> Value {
    serde_json::json!({
        "requestId": alert.request_id.to_string(),
        "itemName": alert.item_name,
        "studentName": alert.requester_name,
        "dueDate": alert.due_date.to_string(),
        "urgency": alert.urgency.as_str(),
        "message": alert.message,
    })
}

pub fn user_to_json(user: &User) -> Value {
    serde_json::json!({
        "id": user.id.to_string(),
        "username": user.username,
        "role": user.role.as_str(),
        "name": user.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_accept_plain_and_rfc3339() {
        let plain = parse_optional_date(Some("2024-03-01"), "dueDate").unwrap();
        let stamped = parse_optional_date(Some("2024-03-01T10:00:00Z"), "dueDate").unwrap();
        assert_eq!(plain, stamped);
        assert_eq!(parse_optional_date(Some("  "), "dueDate").unwrap(), None);
        assert!(parse_optional_date(Some("03/01/2024"), "dueDate").is_err());
    }

    #[test]
    fn integers_accept_numbers_and_numeric_strings() {
        assert_eq!(parse_integer(Some(serde_json::json!(4)), "quantity").unwrap(), Some(4));
        assert_eq!(parse_integer(Some(serde_json::json!("7")), "quantity").unwrap(), Some(7));
        assert_eq!(parse_integer(None, "quantity").unwrap(), None);
        assert!(parse_integer(Some(serde_json::json!(1.5)), "quantity").is_err());
        assert!(parse_integer(Some(serde_json::json!("many")), "quantity").is_err());
    }

    #[test]
    fn status_must_be_a_known_value() {
        let ok = UpdateStatusRequest { status: Some("approved".into()) };
        assert_eq!(ok.target().unwrap(), BorrowStatus::Approved);

        let bad = UpdateStatusRequest { status: Some("lost".into()) };
        assert_eq!(bad.target().unwrap_err().status(), StatusCode::BAD_REQUEST);

        let missing = UpdateStatusRequest { status: None };
        assert!(missing.target().is_err());
    }
}
