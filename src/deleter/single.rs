//! Single-object deletion using the S3 DeleteObject API.
//!
//! Used when batch_size is 1 or the storage cannot batch deletes.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::ForceRetryConfig;
use crate::types::ObjectVersionRef;
use crate::types::error::S3emptyError;
use crate::types::token::PipelineCancellationToken;

use super::{
    DeleteResult, Deleter, DeletionExecutor, delete_with_retries, is_bucket_missing_outcome,
    is_cancelled_outcome,
};

/// Deletes object versions one at a time through the [`DeletionExecutor`].
pub struct SingleDeleter {
    executor: DeletionExecutor,
    force: bool,
    force_retry_config: ForceRetryConfig,
    cancellation_token: PipelineCancellationToken,
}

impl SingleDeleter {
    pub fn new(
        executor: DeletionExecutor,
        force: bool,
        force_retry_config: ForceRetryConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            executor,
            force,
            force_retry_config,
            cancellation_token,
        }
    }
}

#[async_trait]
impl Deleter for SingleDeleter {
    async fn delete(&self, objects: &[ObjectVersionRef]) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        for object in objects {
            let outcome = delete_with_retries(
                &self.executor,
                object,
                self.force,
                &self.force_retry_config,
                &self.cancellation_token,
            )
            .await;

            if is_cancelled_outcome(&outcome) {
                debug!(
                    remaining = objects.len() - result.deleted.len() - result.failed.len(),
                    "deletion cancelled."
                );
                break;
            }
            if is_bucket_missing_outcome(&outcome) {
                error!(
                    bucket = self.executor.bucket(),
                    "bucket disappeared during DeleteObject."
                );
                return Err(anyhow!(S3emptyError::BucketNotFound(
                    self.executor.bucket().to_string()
                )));
            }

            if outcome.succeeded {
                debug!(
                    key = object.key,
                    version_id = object.version_id,
                    "DeleteObject succeeded."
                );
            } else {
                warn!(
                    key = object.key,
                    version_id = object.version_id,
                    error_kind = ?outcome.error_kind,
                    error = outcome.error_message,
                    "S3 DeleteObject failed for '{}'.",
                    object,
                );
            }
            result.push(outcome);
        }

        Ok(result)
    }
}
