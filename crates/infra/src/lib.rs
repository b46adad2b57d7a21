//! Infrastructure layer: storage backends and the application service.

pub mod service;
pub mod store;

mod integration_tests;

pub use service::{LabService, ServiceError};
pub use store::{CommittedTransition, DeletedItem, InMemoryLabStore, LabStore, PostgresLabStore, StoreError};
