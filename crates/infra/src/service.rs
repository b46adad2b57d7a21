//! Application service: the single entry point for every lab operation.
//!
//! `LabService` validates caller input with the pure domain types, hands the
//! result to a `LabStore`, and maps failures into one flat `ServiceError`
//! taxonomy for the HTTP layer.
//!
//! ```text
//! draft input ──validate──▶ domain value ──LabStore (atomic)──▶ committed record
//!                  │                              │
//!                  └── Validation                 └── NotFound / Conflict /
//!                                                     InvalidTransition / Store
//! ```
//!
//! Store failures are logged here and returned as-is; retrying is a caller
//! concern.

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use labloan_auth::{PasswordError, SignupDraft, User, demo_users};
use labloan_borrowing::{
    BorrowDraft, BorrowRequest, BorrowRequestView, BorrowStatus, DueAlert, RequestFilter,
    due_alerts,
};
use labloan_core::{BorrowRequestId, DomainError, ItemId};
use labloan_inventory::{Item, ItemDraft};

use crate::store::{CommittedTransition, DeletedItem, LabStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Missing or malformed input (user-correctable).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Referenced entity absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// Insufficient stock, duplicate key, or a lost concurrent race.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Status change not permitted from the current state.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    /// Bad credentials.
    #[error("unauthorized")]
    Unauthorized,
    /// Persistence or other infrastructure failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::InvalidTransition { from, to } => ServiceError::InvalidTransition { from, to },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(e) => e.into(),
            StoreError::Backend(msg) => ServiceError::Store(msg),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(value: PasswordError) -> Self {
        ServiceError::Store(value.to_string())
    }
}

/// Log a store outcome at a level matching its kind, then convert it.
fn observe<T>(operation: &'static str, result: Result<T, StoreError>) -> Result<T, ServiceError> {
    result.map_err(|e| {
        match &e {
            StoreError::Backend(msg) => error!(operation, error = %msg, "store failure"),
            StoreError::Domain(DomainError::Conflict(msg)) => warn!(operation, reason = %msg, "rejected"),
            StoreError::Domain(other) => debug!(operation, reason = %other, "rejected"),
        }
        e.into()
    })
}

pub struct LabService<S> {
    store: S,
}

impl<S: LabStore> LabService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // -------------------------
    // Inventory
    // -------------------------

    #[instrument(skip_all, err)]
    pub async fn add_item(&self, draft: ItemDraft) -> Result<Item, ServiceError> {
        let fields = draft.validate(Utc::now().date_naive())?;
        let item = observe("add_item", self.store.insert_item(fields).await)?;
        info!(item_id = %item.id, name = %item.name, quantity = item.quantity, "item added");
        Ok(item)
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Item, ServiceError> {
        observe("get_item", self.store.get_item(id).await)
    }

    #[instrument(skip(self, draft), fields(item_id = %id), err)]
    pub async fn update_item(&self, id: ItemId, draft: ItemDraft) -> Result<Item, ServiceError> {
        let fields = draft.validate_replacement(Utc::now().date_naive())?;
        let item = observe("update_item", self.store.update_item(id, fields).await)?;
        info!(quantity = item.quantity, "item updated");
        Ok(item)
    }

    /// Delete an item together with every borrow request referencing it.
    #[instrument(skip(self), fields(item_id = %id), err)]
    pub async fn delete_item(&self, id: ItemId) -> Result<DeletedItem, ServiceError> {
        let deleted = observe("delete_item", self.store.delete_item(id).await)?;
        info!(removed_requests = deleted.removed_requests, "item deleted");
        Ok(deleted)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    pub async fn adjust_quantity(&self, id: ItemId, delta: i64) -> Result<Item, ServiceError> {
        let item = observe("adjust_quantity", self.store.adjust_quantity(id, delta).await)?;
        info!(quantity = item.quantity, "stock adjusted");
        Ok(item)
    }

    pub async fn list_items(&self) -> Result<Vec<Item>, ServiceError> {
        observe("list_items", self.store.list_items().await)
    }

    // -------------------------
    // Borrow requests
    // -------------------------

    /// Open a `pending` request. Stock is not checked until approval.
    #[instrument(skip_all, err)]
    pub async fn create_request(&self, draft: BorrowDraft) -> Result<BorrowRequest, ServiceError> {
        let new = draft.validate()?;
        let request = observe("create_request", self.store.insert_request(new, Utc::now()).await)?;
        info!(
            request_id = %request.id,
            item_id = %request.item_id,
            quantity = request.quantity,
            "borrow request created"
        );
        Ok(request)
    }

    pub async fn get_request(&self, id: BorrowRequestId) -> Result<BorrowRequest, ServiceError> {
        observe("get_request", self.store.get_request(id).await)
    }

    pub async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BorrowRequestView>, ServiceError> {
        observe("list_requests", self.store.list_requests(filter).await)
    }

    /// Move a request toward `target`, together with its stock adjustment.
    #[instrument(skip(self), fields(request_id = %id), err)]
    pub async fn transition(
        &self,
        id: BorrowRequestId,
        target: BorrowStatus,
    ) -> Result<CommittedTransition, ServiceError> {
        let committed = observe("transition", self.store.transition_request(id, target).await)?;
        info!(
            from = %committed.transition.from,
            to = %committed.transition.to,
            item_id = %committed.item.id,
            stock = committed.item.quantity,
            "borrow request transitioned"
        );
        Ok(committed)
    }

    /// Due/overdue advisory for approved requests, optionally for one requester.
    ///
    /// Without a requester the lines name the borrower (lab-manager view).
    pub async fn due_alerts(
        &self,
        today: NaiveDate,
        requester: Option<String>,
    ) -> Result<Vec<DueAlert>, ServiceError> {
        let name_requester = requester.is_none();
        let filter = RequestFilter {
            requester,
            status: Some(BorrowStatus::Approved),
        };
        let views = self.list_requests(&filter).await?;
        Ok(due_alerts(&views, today, name_requester))
    }

    // -------------------------
    // Users
    // -------------------------

    #[instrument(skip_all, err)]
    pub async fn signup(&self, draft: SignupDraft) -> Result<User, ServiceError> {
        let valid = draft.validate()?;
        let new = hash_off_thread(move || valid.hash()).await?;
        let user = observe("signup", self.store.insert_user(new, Utc::now()).await)?;
        info!(user_id = %user.id, username = %user.username, "account created");
        Ok(user)
    }

    #[instrument(skip(self, password), err)]
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let user = observe("login", self.store.find_user(username).await)?
            .ok_or(ServiceError::Unauthorized)?;

        let candidate = password.to_string();
        let checked = user.clone();
        let ok = hash_off_thread(move || checked.check_password(&candidate)).await?;
        if !ok {
            return Err(ServiceError::Unauthorized);
        }
        Ok(user)
    }

    /// Create the demo accounts if no user exists yet. Returns how many were added.
    pub async fn seed_demo_users(&self) -> Result<usize, ServiceError> {
        if observe("seed_demo_users", self.store.count_users().await)? > 0 {
            return Ok(0);
        }
        let users = hash_off_thread(demo_users).await?;
        let mut added = 0;
        for new in users {
            observe("seed_demo_users", self.store.insert_user(new, Utc::now()).await)?;
            added += 1;
        }
        info!(added, "demo users created");
        Ok(added)
    }
}

/// Run argon2 work on the blocking pool.
async fn hash_off_thread<T, F>(f: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Store(format!("password worker failed: {e}")))?
        .map_err(ServiceError::from)
}
