//! Worker configuration from environment variables.
//!
//! - `LINKGRAPH_DB_PATH`: SQLite database file path (default: "linkgraph.db")
//! - `LINKGRAPH_WORKERS`: number of worker tasks (default: 4)
//! - `LINKGRAPH_LIVE_CONTENT_STORE_URL`, `LINKGRAPH_DRAFT_CONTENT_STORE_URL`:
//!   downstream content stores; payloads are only logged when unset
//! - `LINKGRAPH_MAX_ATTEMPTS`: attempts per job before it is dropped (default: 5)
//! - `LINKGRAPH_RETRY_BACKOFF_MS`: delay before the first retry (default: 500)
//! - `LINKGRAPH_RULES_PATH`: JSON file replacing the built-in rule tables

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use linkgraph_core::{LinkTypeRules, TargetStore};

use crate::content_store::{ContentStore, ContentStores, HttpContentStore, LoggingContentStore};
use crate::error::WorkerError;
use crate::pool::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub workers: usize,
    pub live_content_store_url: Option<String>,
    pub draft_content_store_url: Option<String>,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub rules_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("linkgraph.db"),
            workers: 4,
            live_content_store_url: None,
            draft_content_store_url: None,
            max_attempts: 5,
            retry_backoff: Duration::from_millis(500),
            rules_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let workers = parse_or(&get, "LINKGRAPH_WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(WorkerError::Config {
                reason: "LINKGRAPH_WORKERS must be at least 1".to_string(),
            });
        }
        let max_attempts = parse_or(&get, "LINKGRAPH_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(WorkerError::Config {
                reason: "LINKGRAPH_MAX_ATTEMPTS must be at least 1".to_string(),
            });
        }
        let backoff_ms = parse_or(&get, "LINKGRAPH_RETRY_BACKOFF_MS", 500u64)?;

        Ok(Config {
            db_path: get("LINKGRAPH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            workers,
            live_content_store_url: get("LINKGRAPH_LIVE_CONTENT_STORE_URL"),
            draft_content_store_url: get("LINKGRAPH_DRAFT_CONTENT_STORE_URL"),
            max_attempts,
            retry_backoff: Duration::from_millis(backoff_ms),
            rules_path: get("LINKGRAPH_RULES_PATH").map(PathBuf::from),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_backoff)
    }

    /// The built-in rule tables, or the ones in `rules_path`.
    pub fn load_rules(&self) -> Result<LinkTypeRules, WorkerError> {
        match &self.rules_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                Ok(LinkTypeRules::from_json(&json)?)
            }
            None => Ok(LinkTypeRules::standard()),
        }
    }

    pub fn content_stores(&self) -> ContentStores {
        ContentStores::new(
            content_store(self.live_content_store_url.as_deref(), TargetStore::Live),
            content_store(self.draft_content_store_url.as_deref(), TargetStore::Draft),
        )
    }
}

fn content_store(url: Option<&str>, target: TargetStore) -> Arc<dyn ContentStore> {
    match url {
        Some(url) => Arc::new(HttpContentStore::new(url)),
        None => Arc::new(LoggingContentStore::new(target)),
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, WorkerError> {
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| WorkerError::Config {
            reason: format!("{} has an invalid value {:?}", name, raw),
        }),
        None => Ok(default),
    }
}
