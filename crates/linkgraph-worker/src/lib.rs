//! Versioned downstream propagation.
//!
//! A [`ChangeNotification`] enters through the [`PropagationDispatcher`],
//! which schedules one [`DownstreamJob`] for the changed node and one for each
//! dependee. A pool of [`DownstreamWorker`] tasks drains the queue: each job
//! re-expands its node, writes the result through the versioned
//! expanded-links store, and pushes the payload to the target content store.

pub mod config;
pub mod content_store;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod payload;
pub mod pool;
pub mod queue;
pub mod state;
pub mod worker;

pub use config::Config;
pub use content_store::{
    ContentStore, ContentStores, HttpContentStore, LoggingContentStore, RecordingContentStore,
};
pub use dispatcher::{DispatchSummary, PropagationDispatcher};
pub use error::WorkerError;
pub use messages::{ChangeNotification, DownstreamJob, Priority, SourceMetadata};
pub use payload::DownstreamPayload;
pub use pool::{RetryPolicy, WorkerPool};
pub use queue::{InMemoryJobQueue, JobQueue, QueuedJob};
pub use state::Engine;
pub use worker::{DownstreamWorker, JobOutcome};
