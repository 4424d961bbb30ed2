//! Deletion components used by the bulk eraser.
//!
//! [`DeletionExecutor`] handles one object version. The [`Deleter`] trait
//! has two implementations: [`BatchDeleter`] (multi-object delete API) and
//! [`SingleDeleter`] (one DeleteObject call per version).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::config::{Config, ForceRetryConfig};
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{DeletionOutcome, ErrorKind, ObjectVersionRef, ProgressSink};

pub mod batch;
pub mod executor;
pub mod single;

pub use batch::BatchDeleter;
pub use executor::DeletionExecutor;
pub use single::SingleDeleter;

// ---------------------------------------------------------------------------
// Deleter trait
// ---------------------------------------------------------------------------

/// Result of a deletion call, reporting which versions succeeded and which failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted: Vec<ObjectVersionRef>,
    pub failed: Vec<DeletionOutcome>,
    /// Number of deletions that required clearing a legal hold.
    pub bypassed: u64,
}

impl DeleteResult {
    fn push(&mut self, outcome: DeletionOutcome) {
        if outcome.succeeded {
            if outcome.bypassed {
                self.bypassed += 1;
            }
            self.deleted.push(outcome.object);
        } else {
            self.failed.push(outcome);
        }
    }
}

/// Trait for deletion backends (batch or single mode).
///
/// Per-object failures are reported in [`DeleteResult::failed`]. `Err` is
/// reserved for failures that make the rest of the run pointless, such as
/// the bucket disappearing.
///
/// The cancellation token is checked before every request. A cancelled
/// call returns the versions handled so far; the rest are not reported.
#[async_trait]
pub trait Deleter: Send + Sync {
    async fn delete(&self, objects: &[ObjectVersionRef]) -> Result<DeleteResult>;
}

/// Pick the deletion backend for a run.
///
/// `batch_size == 1` or a storage without multi-object delete support uses
/// [`SingleDeleter`].
pub fn create_deleter(
    storage: Storage,
    config: &Config,
    progress: Option<ProgressSink>,
    cancellation_token: PipelineCancellationToken,
) -> Box<dyn Deleter> {
    let executor = DeletionExecutor::new(storage.clone()).with_progress(progress);

    if config.batch_size <= 1 || !storage.supports_batch_delete() {
        Box::new(SingleDeleter::new(
            executor,
            config.force,
            config.force_retry_config,
            cancellation_token,
        ))
    } else {
        Box::new(BatchDeleter::new(
            storage,
            executor,
            config.force,
            config.force_retry_config,
            cancellation_token,
        ))
    }
}

/// An outcome produced because the token was cancelled before the request.
pub(crate) fn is_cancelled_outcome(outcome: &DeletionOutcome) -> bool {
    outcome.error_kind == Some(ErrorKind::Cancelled)
}

/// A failed outcome whose cause is the bucket itself being gone.
pub(crate) fn is_bucket_missing_outcome(outcome: &DeletionOutcome) -> bool {
    !outcome.succeeded && outcome.error_kind == Some(ErrorKind::NotFound)
}

/// Delete one version, retrying transient failures up to
/// `force_retry_count` additional times.
///
/// Returns an [`ErrorKind::Cancelled`] outcome without sending a request
/// once the token is cancelled, including while waiting between attempts.
pub(crate) async fn delete_with_retries(
    executor: &DeletionExecutor,
    object: &ObjectVersionRef,
    force: bool,
    retry_config: &ForceRetryConfig,
    cancellation_token: &PipelineCancellationToken,
) -> DeletionOutcome {
    let max_attempts = retry_config.force_retry_count + 1;
    let mut attempt = 1;
    loop {
        if cancellation_token.is_cancelled() {
            return cancelled_outcome(object);
        }

        let outcome = executor.delete(object, force).await;
        if outcome.error_kind != Some(ErrorKind::Transient) || attempt >= max_attempts {
            return outcome;
        }

        warn!(
            key = object.key,
            version_id = object.version_id,
            attempt = attempt,
            max_attempts = max_attempts,
            error = outcome.error_message,
            "S3 DeleteObject attempt {}/{} failed for '{}'.",
            attempt,
            max_attempts,
            object,
        );

        let interval = Duration::from_millis(retry_config.force_retry_interval_milliseconds);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancellation_token.cancelled() => return cancelled_outcome(object),
        }
        attempt += 1;
    }
}

fn cancelled_outcome(object: &ObjectVersionRef) -> DeletionOutcome {
    DeletionOutcome::failure(
        object.clone(),
        ErrorKind::Cancelled,
        "deletion cancelled before the request was sent.".to_string(),
    )
}
