use std::sync::Arc;

use anyhow::Context;

use labloan_infra::{InMemoryLabStore, LabService, LabStore, PostgresLabStore};

use crate::config::{Config, StoreConfig};

/// Service type shared by every handler (store chosen at startup).
pub type AppServices = LabService<Arc<dyn LabStore>>;

pub async fn build_services(config: &Config) -> anyhow::Result<Arc<AppServices>> {
    let store: Arc<dyn LabStore> = match &config.store {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory store");
            Arc::new(InMemoryLabStore::new())
        }
        StoreConfig::Postgres { database_url } => {
            tracing::info!("using postgres store");
            let store = PostgresLabStore::connect(database_url)
                .await
                .context("failed to connect to postgres")?;
            Arc::new(store)
        }
    };
    Ok(Arc::new(LabService::new(store)))
}

/// In-memory services for tests and local runs.
pub fn in_memory_services() -> Arc<AppServices> {
    let store: Arc<dyn LabStore> = Arc::new(InMemoryLabStore::new());
    Arc::new(LabService::new(store))
}
