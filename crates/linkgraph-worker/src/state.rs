//! Shared engine state: storage, rule tables, queue, dispatcher and worker.
//!
//! [`Engine`] wires one [`Backend`] and one immutable [`LinkTypeRules`]
//! value into the dispatcher and the worker. Both only ever hold `Arc`s, so
//! the engine is cheap to clone into tasks.

use std::sync::Arc;

use linkgraph_core::LinkTypeRules;
use linkgraph_storage::{Backend, SqliteStore};

use crate::config::Config;
use crate::content_store::ContentStores;
use crate::dispatcher::{DispatchSummary, PropagationDispatcher};
use crate::error::WorkerError;
use crate::messages::ChangeNotification;
use crate::pool::{RetryPolicy, WorkerPool};
use crate::queue::InMemoryJobQueue;
use crate::worker::DownstreamWorker;

#[derive(Clone)]
pub struct Engine {
    pub backend: Arc<dyn Backend>,
    pub rules: Arc<LinkTypeRules>,
    pub queue: Arc<InMemoryJobQueue>,
    pub dispatcher: Arc<PropagationDispatcher>,
    pub worker: Arc<DownstreamWorker>,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn Backend>,
        rules: Arc<LinkTypeRules>,
        content_stores: ContentStores,
    ) -> Self {
        let queue = Arc::new(InMemoryJobQueue::new());
        let dispatcher = Arc::new(PropagationDispatcher::new(
            Arc::clone(&backend),
            Arc::clone(&rules),
            queue.clone(),
        ));
        let worker = Arc::new(DownstreamWorker::new(
            Arc::clone(&backend),
            Arc::clone(&rules),
            content_stores,
            Arc::clone(&dispatcher),
        ));
        Engine {
            backend,
            rules,
            queue,
            dispatcher,
            worker,
        }
    }

    /// An engine over the SQLite database and content stores named in
    /// `config`.
    pub fn from_config(config: &Config) -> Result<Self, WorkerError> {
        let backend: Arc<dyn Backend> = Arc::new(SqliteStore::new(&config.db_path)?);
        let rules = Arc::new(config.load_rules()?);
        tracing::info!(
            db_path = %config.db_path.display(),
            paths = rules.paths().len(),
            "engine ready"
        );
        Ok(Engine::new(backend, rules, config.content_stores()))
    }

    pub fn start(&self, workers: usize, policy: RetryPolicy) -> WorkerPool {
        WorkerPool::spawn(workers, Arc::clone(&self.queue), Arc::clone(&self.worker), policy)
    }

    pub async fn submit(&self, change: &ChangeNotification) -> Result<DispatchSummary, WorkerError> {
        self.dispatcher.dispatch(change).await
    }

    /// Waits until every scheduled job, retries included, has settled.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }
}
