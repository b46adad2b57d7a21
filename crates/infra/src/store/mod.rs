//! Storage boundary for the lab tracker.
//!
//! `LabStore` is the only way state changes; the in-memory implementation
//! backs dev/test, the Postgres one backs persistent deployments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLabStore;
pub use postgres::PostgresLabStore;
pub use r#trait::{CommittedTransition, DeletedItem, LabStore, StoreError};
