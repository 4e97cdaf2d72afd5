//! Downstream content stores that receive expanded payloads.
//!
//! - [`HttpContentStore`]: PUTs JSON to a remote content store
//! - [`RecordingContentStore`]: keeps the latest payload per base path in memory
//! - [`LoggingContentStore`]: logs payloads instead of delivering them

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;

use linkgraph_core::TargetStore;

use crate::error::WorkerError;
use crate::payload::DownstreamPayload;

/// Idempotent put of a payload, keyed by its base path.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put_content(
        &self,
        base_path: &str,
        payload: &DownstreamPayload,
    ) -> Result<(), WorkerError>;
}

/// The store each target is delivered to.
#[derive(Clone)]
pub struct ContentStores {
    pub live: Arc<dyn ContentStore>,
    pub draft: Arc<dyn ContentStore>,
}

impl ContentStores {
    pub fn new(live: Arc<dyn ContentStore>, draft: Arc<dyn ContentStore>) -> Self {
        ContentStores { live, draft }
    }

    pub fn for_target(&self, target: TargetStore) -> &Arc<dyn ContentStore> {
        match target {
            TargetStore::Live => &self.live,
            TargetStore::Draft => &self.draft,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub struct HttpContentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        HttpContentStore {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, base_path: &str) -> String {
        format!("{}/content{}", self.base_url, base_path)
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn put_content(
        &self,
        base_path: &str,
        payload: &DownstreamPayload,
    ) -> Result<(), WorkerError> {
        let endpoint = self.endpoint(base_path);
        let response = self
            .client
            .put(&endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|err| WorkerError::TransientDelivery {
                reason: format!("PUT {} failed: {}", endpoint, err),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // The store already holds a newer payload for this path.
        if status == StatusCode::CONFLICT {
            tracing::debug!(
                base_path,
                payload_version = payload.payload_version,
                "content store kept a newer payload"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(&endpoint, status, &body))
    }
}

/// Server errors and rate limiting are worth retrying; any other status
/// means the store refused this payload and will refuse it again.
fn status_error(endpoint: &str, status: StatusCode, body: &str) -> WorkerError {
    let reason = format!("PUT {} returned {}: {}", endpoint, status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        WorkerError::TransientDelivery { reason }
    } else {
        WorkerError::DeliveryRejected {
            status: status.as_u16(),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps the newest payload per base path, the way a content store would.
#[derive(Default)]
pub struct RecordingContentStore {
    payloads: DashMap<String, DownstreamPayload>,
    puts: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl RecordingContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` puts fail with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn get(&self, base_path: &str) -> Option<DownstreamPayload> {
        self.payloads.get(base_path).map(|entry| entry.value().clone())
    }

    /// Successful puts, including ones that lost to a newer payload.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn base_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.payloads.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ContentStore for RecordingContentStore {
    async fn put_content(
        &self,
        base_path: &str,
        payload: &DownstreamPayload,
    ) -> Result<(), WorkerError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WorkerError::TransientDelivery {
                reason: format!("simulated failure for {}", base_path),
            });
        }

        self.puts.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .entry(base_path.to_string())
            .and_modify(|stored| {
                if stored.payload_version <= payload.payload_version {
                    *stored = payload.clone();
                }
            })
            .or_insert_with(|| payload.clone());
        Ok(())
    }
}

/// Used when no content store URL is configured.
pub struct LoggingContentStore {
    target: TargetStore,
}

impl LoggingContentStore {
    pub fn new(target: TargetStore) -> Self {
        LoggingContentStore { target }
    }
}

#[async_trait]
impl ContentStore for LoggingContentStore {
    async fn put_content(
        &self,
        base_path: &str,
        payload: &DownstreamPayload,
    ) -> Result<(), WorkerError> {
        tracing::info!(
            target_store = self.target.as_str(),
            base_path,
            payload_version = payload.payload_version,
            link_types = payload.expanded_links.len(),
            "payload ready (no content store configured)"
        );
        Ok(())
    }
}
