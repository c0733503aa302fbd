use std::path::Path;

use crate::error::{StoreError, StoreResult};

pub const DATABASE_URL_VAR: &str = "CHAT_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "CHAT_DB_MAX_CONNECTIONS";

const DEFAULT_DATABASE_URL: &str = "sqlite://chat.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(DATABASE_URL_VAR).filter(|v| !v.trim().is_empty()) {
            config.database_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(MAX_CONNECTIONS_VAR) {
            config.max_connections = match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(StoreError::Config(format!(
                        "{MAX_CONNECTIONS_VAR} must be a positive integer, got {raw:?}"
                    )))
                }
            };
        }

        Ok(config)
    }
}
