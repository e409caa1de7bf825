//! Background job orchestration.

pub mod payload;
pub mod queue;
pub mod runtime;

use std::sync::Arc;

use crate::application::optimizer::SuggestionService;
use crate::application::repos::{BatchesRepo, ConnectionsRepo, JobsRepo};
use crate::application::scanner::ScanService;
use crate::application::webhooks::WebhookNotifier;
use crate::cache::CacheState;

pub use payload::JobPayload;
pub use queue::{CancelRegistry, JobQueue};
pub use runtime::JobRunner;

/// Shared services the runner needs to execute any job.
pub struct JobContext {
    pub jobs: Arc<dyn JobsRepo>,
    pub batches: Arc<dyn BatchesRepo>,
    pub connections: Arc<dyn ConnectionsRepo>,
    pub scanner: Arc<ScanService>,
    pub optimizer: Arc<SuggestionService>,
    pub notifier: Arc<WebhookNotifier>,
    pub cancels: Arc<CancelRegistry>,
    pub cache: CacheState,
}
