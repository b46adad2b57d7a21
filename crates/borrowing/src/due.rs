//! Due-date advisory for approved requests.
//!
//! Read-only: classification never changes request state.

use chrono::NaiveDate;
use serde::Serialize;

use labloan_core::BorrowRequestId;

use crate::request::{BorrowRequestView, BorrowStatus};

/// How close an approved request is to its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "days")]
pub enum Urgency {
    Overdue,
    DueToday,
    /// Due in 1 or 2 days.
    DueSoon(i64),
    NotUrgent,
}

impl Urgency {
    /// Calendar days from `today` to `due_date` decide the bucket.
    pub fn classify(due_date: NaiveDate, today: NaiveDate) -> Self {
        let days = (due_date - today).num_days();
        match days {
            d if d < 0 => Urgency::Overdue,
            0 => Urgency::DueToday,
            1..=2 => Urgency::DueSoon(days),
            _ => Urgency::NotUrgent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Overdue => "overdue",
            Urgency::DueToday => "due_today",
            Urgency::DueSoon(_) => "due_soon",
            Urgency::NotUrgent => "not_urgent",
        }
    }

    /// Display line for an item, optionally naming who holds it.
    ///
    /// `None` for requests that are not urgent.
    pub fn message(&self, item_name: &str, requester: Option<&str>) -> Option<String> {
        let subject = match requester {
            Some(who) => format!("Item \"{item_name}\" (for {who})"),
            None => format!("Item \"{item_name}\""),
        };
        match self {
            Urgency::Overdue => Some(format!("{subject} is overdue!")),
            Urgency::DueToday => Some(format!("{subject} is due today!")),
            Urgency::DueSoon(days) => Some(format!("{subject} is due in {days} day(s).")),
            Urgency::NotUrgent => None,
        }
    }
}

/// An advisory line for one approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueAlert {
    pub request_id: BorrowRequestId,
    pub item_name: String,
    pub requester_name: String,
    pub due_date: NaiveDate,
    pub urgency: Urgency,
    pub message: String,
}

/// Alerts for every approved, urgent request in `views`, preserving order.
///
/// `name_requester` selects the lab-manager wording that names the borrower.
pub fn due_alerts(views: &[BorrowRequestView], today: NaiveDate, name_requester: bool) -> Vec<DueAlert> {
    views
        .iter()
        .filter(|v| v.request.status == BorrowStatus::Approved)
        .filter_map(|v| {
            let urgency = Urgency::classify(v.request.due_date, today);
            let requester = name_requester.then_some(v.request.requester_name.as_str());
            let message = urgency.message(&v.item_name, requester)?;
            Some(DueAlert {
                request_id: v.request.id,
                item_name: v.item_name.clone(),
                requester_name: v.request.requester_name.clone(),
                due_date: v.request.due_date,
                urgency,
                message,
            })
        })
        .collect()
}
