//! Process configuration from the environment (and an optional `.env` file).
//!
//! | variable | default |
//! |---|---|
//! | `SERVER_HOST` | `0.0.0.0` |
//! | `SERVER_PORT` | `5000` |
//! | `USE_PERSISTENT_STORES` | `false` |
//! | `DATABASE_URL` | required when persistent |
//! | `SEED_DEMO_USERS` | `true` |

use anyhow::bail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub store: StoreConfig,
    pub seed_demo_users: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid SERVER_PORT; using 5000");
                5000
            }),
            None => 5000,
        };

        let store = if flag(&lookup, "USE_PERSISTENT_STORES", false) {
            match lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
                Some(database_url) => StoreConfig::Postgres { database_url },
                None => bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true"),
            }
        } else {
            StoreConfig::InMemory
        };

        Ok(Self {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            store,
            seed_demo_users: flag(&lookup, "SEED_DEMO_USERS", true),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse::<bool>().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid boolean; using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.server_addr(), "0.0.0.0:5000");
        assert_eq!(c.store, StoreConfig::InMemory);
        assert!(c.seed_demo_users);
    }

    #[test]
    fn persistent_store_needs_database_url() {
        assert!(config(&[("USE_PERSISTENT_STORES", "true")]).is_err());

        let c = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/lab"),
        ])
        .unwrap();
        assert_eq!(
            c.store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/lab".to_string()
            }
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        let c = config(&[("SERVER_PORT", "eighty"), ("SEED_DEMO_USERS", "nope")]).unwrap();
        assert_eq!(c.server_port, 5000);
        assert!(c.seed_demo_users);
    }
}
