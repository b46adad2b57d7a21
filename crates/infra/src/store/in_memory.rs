use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use labloan_auth::{NewUser, User};
use labloan_borrowing::{
    BorrowRequest, BorrowRequestView, BorrowStatus, NewBorrowRequest, RequestFilter,
};
use labloan_core::{BorrowRequestId, DomainError, Entity, ItemId, UserId};
use labloan_inventory::{Item, ItemFields};

use super::r#trait::{CommittedTransition, DeletedItem, LabStore, StoreError};

/// Insert or replace a record under its own id.
fn put<E: Entity>(table: &mut HashMap<E::Id, E>, record: E) {
    table.insert(record.id().clone(), record);
}

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<ItemId, Item>,
    requests: HashMap<BorrowRequestId, BorrowRequest>,
    users: HashMap<String, User>,
}

impl Tables {
    fn item(&self, id: ItemId) -> Result<&Item, StoreError> {
        self.items
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("item {id}")).into())
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut Item, StoreError> {
        self.items
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("item {id}")).into())
    }

    fn request(&self, id: BorrowRequestId) -> Result<&BorrowRequest, StoreError> {
        self.requests
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("borrow request {id}")).into())
    }
}

/// In-memory store for tests/dev.
///
/// All tables sit behind a single `RwLock`; every mutation runs inside one
/// write guard, which makes each operation (notably a status change plus its
/// stock adjustment) atomic with respect to every other caller.
#[derive(Debug, Default)]
pub struct InMemoryLabStore {
    tables: RwLock<Tables>,
}

impl InMemoryLabStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl LabStore for InMemoryLabStore {
    async fn insert_item(&self, fields: ItemFields) -> Result<Item, StoreError> {
        let item = Item::new(ItemId::new(), fields);
        put(&mut self.write()?.items, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StoreError> {
        self.read()?.item(id).cloned()
    }

    async fn update_item(&self, id: ItemId, fields: ItemFields) -> Result<Item, StoreError> {
        let mut tables = self.write()?;
        let item = tables.item_mut(id)?;
        item.overwrite(fields);
        Ok(item.clone())
    }

    async fn delete_item(&self, id: ItemId) -> Result<DeletedItem, StoreError> {
        let mut tables = self.write()?;
        let item = tables
            .items
            .remove(&id)
            .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;

        let before = tables.requests.len();
        tables.requests.retain(|_, r| r.item_id != id);
        let removed_requests = before - tables.requests.len();

        Ok(DeletedItem {
            item,
            removed_requests,
        })
    }

    async fn adjust_quantity(&self, id: ItemId, delta: i64) -> Result<Item, StoreError> {
        let mut tables = self.write()?;
        let item = tables.item_mut(id)?;
        item.adjust(delta)?;
        Ok(item.clone())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut items: Vec<Item> = self.read()?.items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn insert_request(
        &self,
        new: NewBorrowRequest,
        request_date: DateTime<Utc>,
    ) -> Result<BorrowRequest, StoreError> {
        let mut tables = self.write()?;
        tables.item(new.item_id)?;

        let request = BorrowRequest::open(BorrowRequestId::new(), new, request_date);
        put(&mut tables.requests, request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: BorrowRequestId) -> Result<BorrowRequest, StoreError> {
        self.read()?.request(id).cloned()
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BorrowRequestView>, StoreError> {
        let tables = self.read()?;
        let mut matching: Vec<BorrowRequest> = tables
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        RequestFilter::sort(&mut matching);

        // Inner-join semantics: a request whose item is gone is not listed.
        Ok(matching
            .into_iter()
            .filter_map(|request| {
                let item_name = tables.items.get(&request.item_id)?.name.clone();
                Some(BorrowRequestView { request, item_name })
            })
            .collect())
    }

    async fn transition_request(
        &self,
        id: BorrowRequestId,
        target: BorrowStatus,
    ) -> Result<CommittedTransition, StoreError> {
        let mut tables = self.write()?;

        let mut request = tables.request(id)?.clone();
        let transition = request.plan_toward(target)?;
        request.apply(&transition)?;

        let mut item = tables.item(transition.item_id)?.clone();
        item.adjust(transition.stock_delta)?;

        // Nothing below can fail: both writes land together.
        put(&mut tables.items, item.clone());
        put(&mut tables.requests, request.clone());

        Ok(CommittedTransition {
            transition,
            request,
            item,
        })
    }

    async fn insert_user(&self, new: NewUser, created_at: DateTime<Utc>) -> Result<User, StoreError> {
        let mut tables = self.write()?;
        if tables.users.contains_key(&new.username) {
            return Err(DomainError::conflict("username already exists").into());
        }
        let user = User::register(UserId::new(), new, created_at);
        tables.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(username).cloned())
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.users.len() as u64)
    }
}
