use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use labloan_core::{BorrowRequestId, DomainError, DomainResult, Entity, ItemId};

/// Borrow request status lifecycle.
///
/// `rejected` and `returned` are terminal; `approved` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Pending,
    Approved,
    Rejected,
    Returned,
}

impl BorrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowStatus::Pending => "pending",
            BorrowStatus::Approved => "approved",
            BorrowStatus::Rejected => "rejected",
            BorrowStatus::Returned => "returned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BorrowStatus::Rejected | BorrowStatus::Returned)
    }
}

impl core::fmt::Display for BorrowStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for BorrowStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(BorrowStatus::Pending),
            "approved" => Ok(BorrowStatus::Approved),
            "rejected" => Ok(BorrowStatus::Rejected),
            "returned" => Ok(BorrowStatus::Returned),
            _ => Err(DomainError::validation(
                "status must be one of: pending, approved, rejected, returned",
            )),
        }
    }
}

/// Status-changing events a privileged actor can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusChange {
    Approve,
    Reject,
    Return,
}

impl StatusChange {
    /// The status this change leads to.
    pub fn target(&self) -> BorrowStatus {
        match self {
            StatusChange::Approve => BorrowStatus::Approved,
            StatusChange::Reject => BorrowStatus::Rejected,
            StatusChange::Return => BorrowStatus::Returned,
        }
    }

    /// The change that leads to `target`, if any. Nothing leads back to `pending`.
    pub fn toward(target: BorrowStatus) -> Option<Self> {
        match target {
            BorrowStatus::Pending => None,
            BorrowStatus::Approved => Some(StatusChange::Approve),
            BorrowStatus::Rejected => Some(StatusChange::Reject),
            BorrowStatus::Returned => Some(StatusChange::Return),
        }
    }
}

/// Unvalidated borrow request input as it arrives from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowDraft {
    pub item_id: Option<ItemId>,
    pub requester_name: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub quantity: Option<i64>,
}

impl BorrowDraft {
    pub fn validate(self) -> DomainResult<NewBorrowRequest> {
        let item_id = self
            .item_id
            .ok_or_else(|| DomainError::validation("itemId is required"))?;
        let requester_name = self
            .requester_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DomainError::validation("studentName is required"))?;
        let due_date = self
            .due_date
            .ok_or_else(|| DomainError::validation("dueDate is required"))?;
        let quantity = match self.quantity {
            Some(q) if q >= 1 => q,
            Some(_) => return Err(DomainError::validation("quantity must be at least 1")),
            None => return Err(DomainError::validation("quantity is required")),
        };

        Ok(NewBorrowRequest {
            item_id,
            requester_name,
            due_date,
            quantity,
        })
    }
}

/// Validated input for creating a borrow request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBorrowRequest {
    pub item_id: ItemId,
    pub requester_name: String,
    pub due_date: NaiveDate,
    pub quantity: i64,
}

/// A planned status change: what the request becomes and how the referenced
/// item's stock must move for the change to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub request_id: BorrowRequestId,
    pub item_id: ItemId,
    pub from: BorrowStatus,
    pub to: BorrowStatus,
    /// Signed change to the item's quantity (zero for rejections).
    pub stock_delta: i64,
}

/// A borrower's intent to take `quantity` units of an item until `due_date`.
///
/// # Invariants
/// - Created `pending`; `request_date` never changes afterwards.
/// - Status only moves along pending -> approved -> returned or
///   pending -> rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    pub id: BorrowRequestId,
    pub item_id: ItemId,
    pub requester_name: String,
    pub quantity: i64,
    pub due_date: NaiveDate,
    pub status: BorrowStatus,
    pub request_date: DateTime<Utc>,
}

impl BorrowRequest {
    /// Open a new `pending` request.
    pub fn open(id: BorrowRequestId, new: NewBorrowRequest, request_date: DateTime<Utc>) -> Self {
        Self {
            id,
            item_id: new.item_id,
            requester_name: new.requester_name,
            quantity: new.quantity,
            due_date: new.due_date,
            status: BorrowStatus::Pending,
            request_date,
        }
    }

    /// Decide whether `change` is allowed from the current status.
    ///
    /// This must not mutate state; committing is done through `apply`.
    pub fn plan(&self, change: StatusChange) -> DomainResult<Transition> {
        let stock_delta = match (self.status, change) {
            (BorrowStatus::Pending, StatusChange::Approve) => -self.quantity,
            (BorrowStatus::Pending, StatusChange::Reject) => 0,
            (BorrowStatus::Approved, StatusChange::Return) => self.quantity,
            (from, change) => return Err(DomainError::invalid_transition(from, change.target())),
        };

        Ok(Transition {
            request_id: self.id,
            item_id: self.item_id,
            from: self.status,
            to: change.target(),
            stock_delta,
        })
    }

    /// Like `plan`, but addressed by the wanted status.
    pub fn plan_toward(&self, target: BorrowStatus) -> DomainResult<Transition> {
        match StatusChange::toward(target) {
            Some(change) => self.plan(change),
            None => Err(DomainError::invalid_transition(self.status, target)),
        }
    }

    /// Commit a transition produced by `plan` on this request.
    pub fn apply(&mut self, transition: &Transition) -> DomainResult<()> {
        if transition.request_id != self.id {
            return Err(DomainError::invalid_id("transition planned for another request"));
        }
        if transition.from != self.status {
            return Err(DomainError::conflict(format!(
                "request changed from {} to {} since the transition was planned",
                transition.from, self.status
            )));
        }
        self.status = transition.to;
        Ok(())
    }
}

impl Entity for BorrowRequest {
    type Id = BorrowRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A request joined with the name of the item it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequestView {
    pub request: BorrowRequest,
    pub item_name: String,
}

/// Optional narrowing of a request listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    /// Exact requester name.
    pub requester: Option<String>,
    pub status: Option<BorrowStatus>,
}

impl RequestFilter {
    pub fn by_requester(name: impl Into<String>) -> Self {
        Self {
            requester: Some(name.into()),
            status: None,
        }
    }

    pub fn by_status(status: BorrowStatus) -> Self {
        Self {
            requester: None,
            status: Some(status),
        }
    }

    pub fn matches(&self, request: &BorrowRequest) -> bool {
        if let Some(name) = &self.requester {
            if &request.requester_name != name {
                return false;
            }
        }
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        true
    }

    /// Listing order: oldest `request_date` first, ties by id.
    pub fn sort(requests: &mut [BorrowRequest]) {
        requests.sort_by(|a, b| {
            a.request_date
                .cmp(&b.request_date)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}
