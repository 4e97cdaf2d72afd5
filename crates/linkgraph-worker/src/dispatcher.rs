//! Turns change notifications into downstream jobs.
//!
//! A change schedules:
//! - the changed node itself at high priority, flagged to re-check its
//!   dependencies once it has been republished
//! - the node's other translations (for a locale-scoped change)
//! - every dependee found by the [`DependencyResolver`]
//!
//! Translations and dependees go to the low partition and never fan out
//! further themselves.

use std::sync::Arc;

use serde::Serialize;

use linkgraph_core::{ContentId, LinkTypeRules, Locale, TargetStore};
use linkgraph_expansion::{Dependee, DependencyResolver};
use linkgraph_storage::{Backend, LinkGraphReader};

use crate::error::WorkerError;
use crate::messages::{ChangeNotification, DownstreamJob, Priority};
use crate::queue::JobQueue;

/// What a dispatch scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Jobs for the changed node itself.
    pub own: usize,
    pub translations: usize,
    pub dependees: usize,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.own + self.translations + self.dependees
    }
}

pub struct PropagationDispatcher {
    backend: Arc<dyn Backend>,
    resolver: DependencyResolver<dyn Backend>,
    queue: Arc<dyn JobQueue>,
}

impl PropagationDispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        rules: Arc<LinkTypeRules>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        PropagationDispatcher {
            resolver: DependencyResolver::new(Arc::clone(&backend), rules),
            backend,
            queue,
        }
    }

    /// Schedules every job a change calls for.
    pub async fn dispatch(
        &self,
        change: &ChangeNotification,
    ) -> Result<DispatchSummary, WorkerError> {
        let meta = &change.source_metadata;
        tracing::info!(
            content_id = %change.content_id,
            locale = change.locale.as_ref().map(Locale::as_str),
            target_store = change.target_store.as_str(),
            payload_version = change.intended_version,
            command = meta.command.as_deref(),
            document_type = meta.document_type.as_deref(),
            changed_fields = ?meta.changed_fields,
            "dispatching change"
        );

        let with_drafts = change.target_store.with_drafts();
        let backend = Arc::clone(&self.backend);
        let content_id = change.content_id;
        let visible =
            tokio::task::spawn_blocking(move || backend.visible_locales(content_id, with_drafts))
                .await??;

        let mut summary = DispatchSummary::default();

        let own_locales: Vec<Locale> = match &change.locale {
            Some(locale) => vec![locale.clone()],
            None => visible.clone(),
        };
        if own_locales.is_empty() {
            tracing::warn!(
                content_id = %change.content_id,
                target_store = change.target_store.as_str(),
                "changed node has no visible edition"
            );
        }
        for locale in own_locales {
            let job = DownstreamJob {
                content_id: change.content_id,
                locale,
                target_store: change.target_store,
                intended_version: change.intended_version,
                recheck_dependencies: true,
                orphaned_content_ids: change.orphaned_content_ids.clone(),
                attempt: 0,
            };
            self.queue.enqueue(job, Priority::High).await;
            summary.own += 1;
        }

        if let Some(locale) = &change.locale {
            for translation in visible.into_iter().filter(|other| other != locale) {
                let job = DownstreamJob::dependee(
                    change.content_id,
                    translation,
                    change.target_store,
                    change.intended_version,
                );
                self.queue.enqueue(job, Priority::Low).await;
                summary.translations += 1;
            }
        }

        summary.dependees = self
            .fan_out(
                change.content_id,
                change.locale.as_ref(),
                change.target_store,
                change.intended_version,
                &change.orphaned_content_ids,
            )
            .await?;
        Ok(summary)
    }

    /// Fans out to the dependees of a job's node, after the node itself was
    /// republished.
    pub async fn recheck(&self, job: &DownstreamJob) -> Result<usize, WorkerError> {
        self.fan_out(
            job.content_id,
            Some(&job.locale),
            job.target_store,
            job.intended_version,
            &job.orphaned_content_ids,
        )
        .await
    }

    /// Dependees of a node, without scheduling anything. Blocks on storage.
    pub fn dependees(
        &self,
        content_id: ContentId,
        locale: Option<&Locale>,
        target: TargetStore,
        orphaned: &[ContentId],
    ) -> Result<Vec<Dependee>, WorkerError> {
        Ok(self.resolver.resolve(content_id, locale, target, orphaned)?)
    }

    async fn fan_out(
        &self,
        content_id: ContentId,
        locale: Option<&Locale>,
        target: TargetStore,
        intended_version: u64,
        orphaned: &[ContentId],
    ) -> Result<usize, WorkerError> {
        let resolver = self.resolver.clone();
        let locale = locale.cloned();
        let orphaned = orphaned.to_vec();
        let dependees = tokio::task::spawn_blocking(move || {
            resolver.resolve(content_id, locale.as_ref(), target, &orphaned)
        })
        .await??;

        let count = dependees.len();
        for dependee in dependees {
            let job = DownstreamJob::dependee(
                dependee.content_id,
                dependee.locale,
                target,
                intended_version,
            );
            self.queue.enqueue(job, Priority::Low).await;
        }
        tracing::debug!(
            content_id = %content_id,
            target_store = target.as_str(),
            dependees = count,
            "fanned out to dependees"
        );
        Ok(count)
    }
}
