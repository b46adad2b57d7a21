use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use labloan_auth::{NewUser, User};
use labloan_borrowing::{
    BorrowRequest, BorrowRequestView, BorrowStatus, NewBorrowRequest, RequestFilter, Transition,
};
use labloan_core::{BorrowRequestId, DomainError, ItemId};
use labloan_inventory::{Item, ItemFields};

/// Store operation error.
///
/// `Domain` carries deterministic rejections decided inside the store's
/// critical section (missing rows, insufficient stock, forbidden transitions).
/// `Backend` is a persistence failure (lock poisoning, database errors).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Result of deleting an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedItem {
    pub item: Item,
    /// Borrow requests removed together with the item (cascade policy).
    pub removed_requests: usize,
}

/// A transition that was applied: the request's new state and the item's
/// stock after the paired adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransition {
    pub transition: Transition,
    pub request: BorrowRequest,
    pub item: Item,
}

/// Persistence boundary for items, borrow requests and users.
///
/// ## Atomicity
///
/// Every method is one atomic unit. In particular `transition_request` plans
/// the status change, adjusts the item's quantity and writes the new status
/// inside one critical section (or database transaction): either both writes
/// become visible or neither does.
///
/// ## Delete policy
///
/// `delete_item` cascades: every borrow request referencing the item is
/// deleted with it.
#[async_trait]
pub trait LabStore: Send + Sync {
    async fn insert_item(&self, fields: ItemFields) -> Result<Item, StoreError>;

    async fn get_item(&self, id: ItemId) -> Result<Item, StoreError>;

    /// Overwrite all mutable fields.
    async fn update_item(&self, id: ItemId, fields: ItemFields) -> Result<Item, StoreError>;

    async fn delete_item(&self, id: ItemId) -> Result<DeletedItem, StoreError>;

    /// Add `delta` to the item's quantity; `Conflict` if it would go negative.
    async fn adjust_quantity(&self, id: ItemId, delta: i64) -> Result<Item, StoreError>;

    /// All items, by name then id.
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    /// Persist a new `pending` request; `NotFound` if the item does not exist.
    async fn insert_request(
        &self,
        new: NewBorrowRequest,
        request_date: DateTime<Utc>,
    ) -> Result<BorrowRequest, StoreError>;

    async fn get_request(&self, id: BorrowRequestId) -> Result<BorrowRequest, StoreError>;

    /// Matching requests joined with their item name, oldest first.
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BorrowRequestView>, StoreError>;

    /// Move a request toward `target`, applying the paired stock adjustment.
    async fn transition_request(
        &self,
        id: BorrowRequestId,
        target: BorrowStatus,
    ) -> Result<CommittedTransition, StoreError>;

    /// `Conflict` when the username is taken.
    async fn insert_user(&self, new: NewUser, created_at: DateTime<Utc>) -> Result<User, StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn count_users(&self) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> LabStore for std::sync::Arc<S>
where
    S: LabStore + ?Sized,
{
    async fn insert_item(&self, fields: ItemFields) -> Result<Item, StoreError> {
        (**self).insert_item(fields).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StoreError> {
        (**self).get_item(id).await
    }

    async fn update_item(&self, id: ItemId, fields: ItemFields) -> Result<Item, StoreError> {
        (**self).update_item(id, fields).await
    }

    async fn delete_item(&self, id: ItemId) -> Result<DeletedItem, StoreError> {
        (**self).delete_item(id).await
    }

    async fn adjust_quantity(&self, id: ItemId, delta: i64) -> Result<Item, StoreError> {
        (**self).adjust_quantity(id, delta).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items().await
    }

    async fn insert_request(
        &self,
        new: NewBorrowRequest,
        request_date: DateTime<Utc>,
    ) -> Result<BorrowRequest, StoreError> {
        (**self).insert_request(new, request_date).await
    }

    async fn get_request(&self, id: BorrowRequestId) -> Result<BorrowRequest, StoreError> {
        (**self).get_request(id).await
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BorrowRequestView>, StoreError> {
        (**self).list_requests(filter).await
    }

    async fn transition_request(
        &self,
        id: BorrowRequestId,
        target: BorrowStatus,
    ) -> Result<CommittedTransition, StoreError> {
        (**self).transition_request(id, target).await
    }

    async fn insert_user(&self, new: NewUser, created_at: DateTime<Utc>) -> Result<User, StoreError> {
        (**self).insert_user(new, created_at).await
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user(username).await
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        (**self).count_users().await
    }
}
