//! Postgres-backed `LabStore`.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |---|---|---|
//! | Database | 23505 (unique) | `Domain(Conflict)` |
//! | Database | 23514 (check) | `Domain(Conflict)` |
//! | Database | 40P01 (deadlock), 40001 (serialization) | `Domain(Conflict)` |
//! | Other | N/A | `Backend` |
//!
//! ## Transactions
//!
//! Every writer locks the item row before any of its request rows. Status
//! changes take `FOR NO KEY UPDATE` on the item and then `FOR UPDATE` on the
//! request; item deletes take `FOR UPDATE` on the item and then delete its
//! requests. Concurrent approvals against one item are serialized by the
//! database and the loser sees the committed stock.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use labloan_auth::{NewUser, Role, User};
use labloan_borrowing::{
    BorrowRequest, BorrowRequestView, BorrowStatus, NewBorrowRequest, RequestFilter,
};
use labloan_core::{BorrowRequestId, DomainError, ItemId, UserId};
use labloan_inventory::{Category, Item, ItemFields};

use super::r#trait::{CommittedTransition, DeletedItem, LabStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity >= 0),
        location TEXT NOT NULL DEFAULT '',
        last_checked DATE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS borrow_requests (
        id UUID PRIMARY KEY,
        item_id UUID NOT NULL REFERENCES items(id) ON DELETE CASCADE,
        student_name TEXT NOT NULL,
        due_date DATE NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity >= 1),
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'approved', 'rejected', 'returned')),
        request_date TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        name TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('admin', 'student')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

const ITEM_COLUMNS: &str = "id, name, category, quantity, location, last_checked";
const REQUEST_COLUMNS: &str = "id, item_id, student_name, due_date, quantity, status, request_date";

/// Postgres-backed lab store.
///
/// Uses the SQLx connection pool, which is thread-safe (Arc + Send + Sync).
pub struct PostgresLabStore {
    pool: Arc<PgPool>,
}

impl PostgresLabStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn lock_item(
        tx: &mut Transaction<'_, Postgres>,
        id: ItemId,
        operation: &str,
    ) -> Result<Item, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR NO KEY UPDATE"
        ))
            .bind(id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
            .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
        item_from_row(&row)
    }

    async fn write_quantity(
        tx: &mut Transaction<'_, Postgres>,
        item: &Item,
        operation: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE items SET quantity = $2 WHERE id = $1")
            .bind(item.id.as_uuid())
            .bind(item.quantity)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(())
    }
}

#[async_trait]
impl LabStore for PostgresLabStore {
    #[instrument(skip(self, fields), err)]
    async fn insert_item(&self, fields: ItemFields) -> Result<Item, StoreError> {
        let item = Item::new(ItemId::new(), fields);
        sqlx::query(
            "INSERT INTO items (id, name, category, quantity, location, last_checked) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.category.as_str())
        .bind(item.quantity)
        .bind(&item.location)
        .bind(item.last_checked)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StoreError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?
            .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
        item_from_row(&row)
    }

    #[instrument(skip_all, fields(item_id = %id), err)]
    async fn update_item(&self, id: ItemId, fields: ItemFields) -> Result<Item, StoreError> {
        let item = Item::new(id, fields);
        let result = sqlx::query(
            "UPDATE items SET name = $2, category = $3, quantity = $4, location = $5, last_checked = $6 \
             WHERE id = $1",
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.category.as_str())
        .bind(item.quantity)
        .bind(&item.location)
        .bind(item.last_checked)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_item", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("item {id}")).into());
        }
        Ok(item)
    }

    #[instrument(skip_all, fields(item_id = %id), err)]
    async fn delete_item(&self, id: ItemId) -> Result<DeletedItem, StoreError> {
        let mut tx = self.begin("delete_item").await?;
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?
            .ok_or_else(|| DomainError::not_found(format!("item {id}")))?;
        let item = item_from_row(&row)?;

        let removed = sqlx::query("DELETE FROM borrow_requests WHERE item_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?
            .rows_affected();

        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("delete_item", e))?;

        Ok(DeletedItem {
            item,
            removed_requests: removed as usize,
        })
    }

    #[instrument(skip_all, fields(item_id = %id, delta = delta), err)]
    async fn adjust_quantity(&self, id: ItemId, delta: i64) -> Result<Item, StoreError> {
        let mut tx = self.begin("adjust_quantity").await?;
        let mut item = Self::lock_item(&mut tx, id, "adjust_quantity").await?;
        item.adjust(delta)?;
        Self::write_quantity(&mut tx, &item, "adjust_quantity").await?;
        tx.commit().await.map_err(|e| map_sqlx_error("adjust_quantity", e))?;
        Ok(item)
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY name ASC, id ASC"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;
        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip_all, fields(item_id = %new.item_id), err)]
    async fn insert_request(
        &self,
        new: NewBorrowRequest,
        request_date: DateTime<Utc>,
    ) -> Result<BorrowRequest, StoreError> {
        let mut tx = self.begin("insert_request").await?;

        let exists = sqlx::query("SELECT 1 FROM items WHERE id = $1 FOR KEY SHARE")
            .bind(new.item_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_request", e))?;
        if exists.is_none() {
            return Err(DomainError::not_found(format!("item {}", new.item_id)).into());
        }

        // TIMESTAMPTZ keeps microseconds; return what a later read will see.
        let request = BorrowRequest::open(BorrowRequestId::new(), new, request_date.trunc_subsecs(6));
        sqlx::query(
            "INSERT INTO borrow_requests (id, item_id, student_name, due_date, quantity, status, request_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(request.id.as_uuid())
        .bind(request.item_id.as_uuid())
        .bind(&request.requester_name)
        .bind(request.due_date)
        .bind(request.quantity)
        .bind(request.status.as_str())
        .bind(request.request_date)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("insert_request", e))?;
        Ok(request)
    }

    async fn get_request(&self, id: BorrowRequestId) -> Result<BorrowRequest, StoreError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM borrow_requests WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_request", e))?
            .ok_or_else(|| DomainError::not_found(format!("borrow request {id}")))?;
        request_from_row(&row)
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<BorrowRequestView>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT br.id, br.item_id, br.student_name, br.due_date, br.quantity, br.status,
                   br.request_date, i.name AS item_name
            FROM borrow_requests br
            JOIN items i ON br.item_id = i.id
            WHERE ($1::TEXT IS NULL OR br.student_name = $1)
              AND ($2::TEXT IS NULL OR br.status = $2)
            ORDER BY br.request_date ASC, br.id ASC
            "#,
        )
        .bind(filter.requester.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;

        rows.iter()
            .map(|row| {
                Ok(BorrowRequestView {
                    request: request_from_row(row)?,
                    item_name: row.try_get("item_name").map_err(decode_error)?,
                })
            })
            .collect()
    }

    #[instrument(skip_all, fields(request_id = %id, target = %target), err)]
    async fn transition_request(
        &self,
        id: BorrowRequestId,
        target: BorrowStatus,
    ) -> Result<CommittedTransition, StoreError> {
        let mut tx = self.begin("transition_request").await?;

        let item_id: Uuid = sqlx::query_scalar("SELECT item_id FROM borrow_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("transition_request", e))?
            .ok_or_else(|| DomainError::not_found(format!("borrow request {id}")))?;

        // Item first, then request: the same order `delete_item` uses.
        let mut item = Self::lock_item(&mut tx, ItemId::from_uuid(item_id), "transition_request").await?;

        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM borrow_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition_request", e))?
        .ok_or_else(|| DomainError::not_found(format!("borrow request {id}")))?;
        let mut request = request_from_row(&row)?;
        if request.item_id != item.id {
            return Err(DomainError::conflict(format!(
                "borrow request {id} changed item while being updated"
            ))
            .into());
        }

        let transition = request.plan_toward(target)?;
        request.apply(&transition)?;

        item.adjust(transition.stock_delta)?;

        if transition.stock_delta != 0 {
            Self::write_quantity(&mut tx, &item, "transition_request").await?;
        }
        sqlx::query("UPDATE borrow_requests SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(request.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("transition_request", e))?;

        // Dropping `tx` on any earlier error rolls both writes back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("transition_request", e))?;

        Ok(CommittedTransition {
            transition,
            request,
            item,
        })
    }

    #[instrument(skip_all, fields(username = %new.username), err)]
    async fn insert_user(&self, new: NewUser, created_at: DateTime<Utc>) -> Result<User, StoreError> {
        let user = User::register(UserId::new(), new, created_at);
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, name, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Domain(DomainError::conflict("username already exists"))
            } else {
                map_sqlx_error("insert_user", e)
            }
        })?;
        Ok(user)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, name, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn count_users(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", e))?;
        Ok(count.max(0) as u64)
    }
}

// SQLx row mapping

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let category: String = row.try_get("category").map_err(decode_error)?;
    let last_checked: NaiveDate = row.try_get("last_checked").map_err(decode_error)?;
    Ok(Item {
        id: ItemId::from_uuid(id),
        name: row.try_get("name").map_err(decode_error)?,
        category: Category::from_str(&category)
            .map_err(|_| StoreError::Backend(format!("unknown category in row: {category}")))?,
        quantity: row.try_get("quantity").map_err(decode_error)?,
        location: row.try_get("location").map_err(decode_error)?,
        last_checked,
    })
}

fn request_from_row(row: &PgRow) -> Result<BorrowRequest, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let item_id: Uuid = row.try_get("item_id").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    Ok(BorrowRequest {
        id: BorrowRequestId::from_uuid(id),
        item_id: ItemId::from_uuid(item_id),
        requester_name: row.try_get("student_name").map_err(decode_error)?,
        quantity: row.try_get("quantity").map_err(decode_error)?,
        due_date: row.try_get("due_date").map_err(decode_error)?,
        status: BorrowStatus::from_str(&status)
            .map_err(|_| StoreError::Backend(format!("unknown status in row: {status}")))?,
        request_date: row.try_get("request_date").map_err(decode_error)?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    Ok(User {
        id: UserId::from_uuid(id),
        username: row.try_get("username").map_err(decode_error)?,
        name: row.try_get("name").map_err(decode_error)?,
        role: Role::from_str(&role)
            .map_err(|_| StoreError::Backend(format!("unknown role in row: {role}")))?,
        password_hash: row.try_get("password_hash").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
    })
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") | Some("23514") | Some("40P01") | Some("40001") => {
                StoreError::Domain(DomainError::conflict(format!("{operation}: {}", db_err.message())))
            }
            _ => StoreError::Backend(format!("database error in {operation}: {}", db_err.message())),
        },
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    //! These tests need a scratch database: `DATABASE_URL=... cargo test -- --ignored`.

    use super::*;

    async fn store() -> PostgresLabStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
        PostgresLabStore::connect(&url).await.expect("failed to connect")
    }

    fn fields(quantity: i64) -> ItemFields {
        ItemFields {
            name: format!("Arduino Uno {}", Uuid::now_v7()),
            category: Category::Ic,
            quantity,
            location: "Drawer 4".to_string(),
            last_checked: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        }
    }

    fn request(item_id: ItemId, who: &str, quantity: i64) -> NewBorrowRequest {
        NewBorrowRequest {
            item_id,
            requester_name: who.to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 4, 20).unwrap(),
            quantity,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn approval_race_scenario() {
        let store = store().await;
        let item = store.insert_item(fields(5)).await.unwrap();
        let a = store.insert_request(request(item.id, "Alice", 3), Utc::now()).await.unwrap();
        let b = store.insert_request(request(item.id, "Bob", 3), Utc::now()).await.unwrap();

        let approved = store.transition_request(a.id, BorrowStatus::Approved).await.unwrap();
        assert_eq!(approved.item.quantity, 2);

        let err = store.transition_request(b.id, BorrowStatus::Approved).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
        assert_eq!(store.get_request(b.id).await.unwrap().status, BorrowStatus::Pending);

        let returned = store.transition_request(a.id, BorrowStatus::Returned).await.unwrap();
        assert_eq!(returned.item.quantity, 5);

        let deleted = store.delete_item(item.id).await.unwrap();
        assert_eq!(deleted.removed_requests, 2);
    }

    #[tokio::test]
    #[ignore]
    async fn inserted_request_reads_back_identically() {
        let store = store().await;
        let item = store.insert_item(fields(1)).await.unwrap();
        let created = store.insert_request(request(item.id, "Alice", 1), Utc::now()).await.unwrap();
        assert_eq!(store.get_request(created.id).await.unwrap(), created);
        store.delete_item(item.id).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn transitions_racing_item_delete_never_deadlock() {
        let store = Arc::new(store().await);

        for _ in 0..50 {
            let item = store.insert_item(fields(10)).await.unwrap();
            let mut ids = Vec::new();
            for who in ["Alice", "Bob", "Carol", "Dan"] {
                ids.push(store.insert_request(request(item.id, who, 2), Utc::now()).await.unwrap().id);
            }

            let mut handles = Vec::new();
            for id in ids {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    store.transition_request(id, BorrowStatus::Approved).await.map(|_| ())
                }));
            }
            let deleter = {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.delete_item(item.id).await.map(|_| ()) })
            };

            for handle in handles {
                match handle.await.unwrap() {
                    Ok(()) | Err(StoreError::Domain(_)) => {}
                    Err(e) => panic!("transition failed with backend error: {e}"),
                }
            }
            match deleter.await.unwrap() {
                Ok(()) | Err(StoreError::Domain(_)) => {}
                Err(e) => panic!("delete failed with backend error: {e}"),
            }
        }
    }

    #[tokio::test]
    #[ignore]
    async fn duplicate_username_is_conflict() {
        let store = store().await;
        let username = format!("user-{}", Uuid::now_v7());
        let new = NewUser {
            username: username.clone(),
            name: "Jane".to_string(),
            role: Role::Student,
            password_hash: "$argon2id$dummy".to_string(),
        };
        store.insert_user(new.clone(), Utc::now()).await.unwrap();
        let err = store.insert_user(new, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
        assert_eq!(store.find_user(&username).await.unwrap().unwrap().role, Role::Student);
    }
}
