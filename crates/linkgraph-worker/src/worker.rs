//! The per-node unit of work: re-expand, materialize, push.

use std::sync::Arc;

use serde::Serialize;

use linkgraph_core::{Edition, ExpandedLinks, ExpandedLinksKey, LinkTypeRules};
use linkgraph_expansion::LinkExpander;
use linkgraph_storage::{Backend, ExpandedLinksStore, LinkGraphReader, UpdateOutcome};

use crate::content_store::ContentStores;
use crate::dispatcher::PropagationDispatcher;
use crate::error::WorkerError;
use crate::messages::DownstreamJob;
use crate::payload::DownstreamPayload;

/// How a job ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Materialized and delivered downstream.
    Pushed { payload_version: u64 },
    /// Materialized only; the node has no base path to deliver to.
    Materialized { payload_version: u64 },
    /// A newer version was already materialized. Nothing was delivered.
    Stale { stored_version: u64 },
}

pub struct DownstreamWorker {
    backend: Arc<dyn Backend>,
    rules: Arc<LinkTypeRules>,
    expander: LinkExpander<dyn Backend>,
    content_stores: ContentStores,
    dispatcher: Arc<PropagationDispatcher>,
}

impl DownstreamWorker {
    pub fn new(
        backend: Arc<dyn Backend>,
        rules: Arc<LinkTypeRules>,
        content_stores: ContentStores,
        dispatcher: Arc<PropagationDispatcher>,
    ) -> Self {
        DownstreamWorker {
            expander: LinkExpander::new(Arc::clone(&backend), Arc::clone(&rules)),
            backend,
            rules,
            content_stores,
            dispatcher,
        }
    }

    /// Runs one job.
    ///
    /// Reading the graph and writing the record under its key lock happen on
    /// the blocking pool; delivery happens after the lock is released.
    pub async fn perform(&self, job: &DownstreamJob) -> Result<JobOutcome, WorkerError> {
        let backend = Arc::clone(&self.backend);
        let expander = self.expander.clone();
        let blocking_job = job.clone();
        let materialized = tokio::task::spawn_blocking(move || {
            materialize(backend.as_ref(), &expander, &blocking_job)
        })
        .await??;

        let (edition, expanded) = match materialized {
            Materialization::Written { edition, expanded } => (edition, expanded),
            Materialization::Stale { stored_version } => {
                tracing::info!(
                    content_id = %job.content_id,
                    locale = %job.locale,
                    target_store = job.target_store.as_str(),
                    payload_version = job.intended_version,
                    stored_version,
                    "skipped stale update"
                );
                return Ok(JobOutcome::Stale { stored_version });
            }
        };

        let payload = DownstreamPayload::build(
            &edition,
            &self.rules,
            job.target_store,
            expanded,
            job.intended_version,
        );
        let outcome = match payload.base_path() {
            Some(base_path) => {
                self.content_stores
                    .for_target(job.target_store)
                    .put_content(base_path, &payload)
                    .await?;
                JobOutcome::Pushed {
                    payload_version: job.intended_version,
                }
            }
            None => JobOutcome::Materialized {
                payload_version: job.intended_version,
            },
        };
        tracing::info!(
            content_id = %job.content_id,
            locale = %job.locale,
            target_store = job.target_store.as_str(),
            payload_version = job.intended_version,
            outcome = ?outcome,
            "downstream job done"
        );

        if job.recheck_dependencies {
            self.dispatcher.recheck(job).await?;
        }
        Ok(outcome)
    }
}

enum Materialization {
    Written {
        edition: Edition,
        expanded: ExpandedLinks,
    },
    Stale {
        stored_version: u64,
    },
}

/// Expands the job's node and writes the record if the job is not stale.
fn materialize(
    backend: &dyn Backend,
    expander: &LinkExpander<dyn Backend>,
    job: &DownstreamJob,
) -> Result<Materialization, WorkerError> {
    let with_drafts = job.target_store.with_drafts();
    let edition = backend
        .visible_edition(job.content_id, &job.locale, with_drafts)?
        .ok_or_else(|| WorkerError::MissingTarget {
            content_id: job.content_id,
            locale: job.locale.clone(),
        })?;

    if let Some(base_path) = &edition.base_path {
        if !base_path.starts_with('/') {
            return Err(WorkerError::InvariantViolation {
                content_id: job.content_id,
                reason: format!("base path {:?} is not absolute", base_path),
            });
        }
    }

    let expanded = expander.expand(job.content_id, &job.locale, with_drafts)?;

    let key = ExpandedLinksKey::new(job.content_id, job.locale.clone(), job.target_store);
    match backend.locked_update(&key, job.intended_version, &expanded)? {
        UpdateOutcome::Skipped { stored_version } => Ok(Materialization::Stale { stored_version }),
        UpdateOutcome::Created | UpdateOutcome::Applied { .. } => {
            Ok(Materialization::Written { edition, expanded })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::RecordingContentStore;
    use crate::queue::InMemoryJobQueue;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    use linkgraph_core::{
        ContentId, Edition, EditionState, ExpandedLinks, ExpandedLinksRecord, LinkEdge, LinkScope,
        LinkType, LinkTypeFilter, Locale, TargetStore,
    };
    use linkgraph_storage::{ContentRepository, InMemoryStore, StorageError};

    struct Fixture {
        store: Arc<InMemoryStore>,
        queue: Arc<InMemoryJobQueue>,
        live: Arc<RecordingContentStore>,
        worker: DownstreamWorker,
    }

    fn build(
        backend: Arc<dyn Backend>,
    ) -> (DownstreamWorker, Arc<InMemoryJobQueue>, Arc<RecordingContentStore>) {
        let rules = Arc::new(LinkTypeRules::standard());
        let queue = Arc::new(InMemoryJobQueue::new());
        let live = Arc::new(RecordingContentStore::new());
        let draft = Arc::new(RecordingContentStore::new());
        let dispatcher = Arc::new(PropagationDispatcher::new(
            Arc::clone(&backend),
            Arc::clone(&rules),
            queue.clone(),
        ));
        let worker = DownstreamWorker::new(
            backend,
            rules,
            ContentStores::new(live.clone(), draft),
            dispatcher,
        );
        (worker, queue, live)
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let (worker, queue, live) = build(store.clone());
        Fixture {
            store,
            queue,
            live,
            worker,
        }
    }

    fn job(id: ContentId, version: u64) -> DownstreamJob {
        DownstreamJob::dependee(id, Locale::from("en"), TargetStore::Live, version)
    }

    fn publish(f: &Fixture, base_path: Option<&str>) -> ContentId {
        let id = ContentId::new_v4();
        let mut edition = Edition::new(id, Locale::from("en"), EditionState::Published, "guide", "A");
        edition.base_path = base_path.map(str::to_string);
        f.store.put_edition(edition).unwrap();
        id
    }

    #[tokio::test]
    async fn missing_node_fails_without_retry() {
        let f = fixture();
        let err = f.worker.perform(&job(ContentId::new_v4(), 1)).await.unwrap_err();
        assert!(matches!(err, WorkerError::MissingTarget { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn relative_base_path_is_an_invariant_violation() {
        let f = fixture();
        let id = publish(&f, Some("no-leading-slash"));

        let err = f.worker.perform(&job(id, 1)).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvariantViolation { .. }));
        let key = ExpandedLinksKey::new(id, Locale::from("en"), TargetStore::Live);
        assert!(f.store.find_expanded_links(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn node_without_base_path_is_materialized_only() {
        let f = fixture();
        let id = publish(&f, None);

        let outcome = f.worker.perform(&job(id, 4)).await.unwrap();
        assert_eq!(outcome, JobOutcome::Materialized { payload_version: 4 });
        assert_eq!(f.live.put_count(), 0);
    }

    #[tokio::test]
    async fn stale_job_is_not_delivered() {
        let f = fixture();
        let id = publish(&f, Some("/a"));
        let key = ExpandedLinksKey::new(id, Locale::from("en"), TargetStore::Live);
        f.store.locked_update(&key, 9, &ExpandedLinks::new()).unwrap();

        let outcome = f.worker.perform(&job(id, 3)).await.unwrap();
        assert_eq!(outcome, JobOutcome::Stale { stored_version: 9 });
        assert_eq!(f.live.put_count(), 0);
    }

    #[tokio::test]
    async fn recheck_enqueues_dependees_after_delivery() {
        let f = fixture();
        let id = publish(&f, Some("/a"));
        let orphan = publish(&f, Some("/b"));
        let mut own = job(id, 2);
        own.recheck_dependencies = true;
        own.orphaned_content_ids = vec![orphan];

        let outcome = f.worker.perform(&own).await.unwrap();
        assert_eq!(outcome, JobOutcome::Pushed { payload_version: 2 });
        assert_eq!(f.live.get("/a").unwrap().payload_version, 2);

        let queued = f.queue.try_next().unwrap();
        assert_eq!(queued.job.content_id, orphan);
        assert!(!queued.job.recheck_dependencies);
    }

    /// Holds every record write until `release` is signalled.
    struct GatedStore {
        inner: InMemoryStore,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl LinkGraphReader for GatedStore {
        fn links_from(
            &self,
            source: ContentId,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.inner.links_from(source, filter)
        }

        fn links_to(
            &self,
            target: ContentId,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.inner.links_to(target, filter)
        }

        fn edition_links_from(
            &self,
            source: ContentId,
            locale: &Locale,
            with_drafts: bool,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.inner.edition_links_from(source, locale, with_drafts, filter)
        }

        fn edition_links_to(
            &self,
            target: ContentId,
            with_drafts: bool,
            filter: &LinkTypeFilter,
        ) -> Result<Vec<LinkEdge>, StorageError> {
            self.inner.edition_links_to(target, with_drafts, filter)
        }

        fn visible_edition(
            &self,
            content_id: ContentId,
            locale: &Locale,
            with_drafts: bool,
        ) -> Result<Option<Edition>, StorageError> {
            self.inner.visible_edition(content_id, locale, with_drafts)
        }

        fn visible_locales(
            &self,
            content_id: ContentId,
            with_drafts: bool,
        ) -> Result<Vec<Locale>, StorageError> {
            self.inner.visible_locales(content_id, with_drafts)
        }
    }

    impl ContentRepository for GatedStore {
        fn put_edition(&self, edition: Edition) -> Result<(), StorageError> {
            self.inner.put_edition(edition)
        }

        fn remove_content(&self, content_id: ContentId) -> Result<(), StorageError> {
            self.inner.remove_content(content_id)
        }

        fn add_link(&self, edge: LinkEdge) -> Result<(), StorageError> {
            self.inner.add_link(edge)
        }

        fn replace_links(
            &self,
            source: ContentId,
            link_type: &LinkType,
            scope: &LinkScope,
            targets: &[ContentId],
        ) -> Result<Vec<ContentId>, StorageError> {
            self.inner.replace_links(source, link_type, scope, targets)
        }
    }

    impl ExpandedLinksStore for GatedStore {
        fn locked_update(
            &self,
            key: &ExpandedLinksKey,
            payload_version: u64,
            expanded_links: &ExpandedLinks,
        ) -> Result<UpdateOutcome, StorageError> {
            let gate = self
                .gate
                .lock()
                .map_err(|_| StorageError::LockPoisoned("gate".into()))?;
            gate.recv_timeout(Duration::from_secs(2))
                .map_err(|_| StorageError::IntegrityError {
                    reason: "write was never released".into(),
                })?;
            self.inner.locked_update(key, payload_version, expanded_links)
        }

        fn find_expanded_links(
            &self,
            key: &ExpandedLinksKey,
        ) -> Result<Option<ExpandedLinksRecord>, StorageError> {
            self.inner.find_expanded_links(key)
        }
    }

    #[tokio::test]
    async fn storage_work_leaves_the_runtime_free() {
        let (release, gate) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: InMemoryStore::new(),
            gate: Mutex::new(gate),
        });
        let id = ContentId::new_v4();
        store
            .put_edition(
                Edition::new(id, Locale::from("en"), EditionState::Published, "guide", "A")
                    .with_base_path("/gated"),
            )
            .unwrap();
        let (worker, _queue, live) = build(store);

        let running = tokio::spawn(async move { worker.perform(&job(id, 1)).await });
        // The single runtime thread must stay free while the write waits.
        tokio::time::sleep(Duration::from_millis(20)).await;
        release.send(()).unwrap();

        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome, JobOutcome::Pushed { payload_version: 1 });
        assert_eq!(live.get("/gated").unwrap().payload_version, 1);
    }
}
