//! Batch deletion using the S3 DeleteObjects API.
//!
//! Objects are sent in quiet mode, so only failed members come back.
//! Failed members are resolved individually: not-found counts as deleted,
//! access denials go through the legal-hold check and transient errors
//! fall back to bounded single-object retries.

use std::collections::HashSet;
use std::ops::ControlFlow;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::ForceRetryConfig;
use crate::storage::Storage;
use crate::types::error::{S3emptyError, classify_error, classify_error_code, error_code};
use crate::types::token::PipelineCancellationToken;
use crate::types::{BatchDeleteError, DeletionOutcome, ErrorKind, ObjectVersionRef};

use super::{
    DeleteResult, Deleter, DeletionExecutor, delete_with_retries, is_bucket_missing_outcome,
    is_cancelled_outcome,
};

/// Maximum objects per batch DeleteObjects API call (S3 limit).
pub const MAX_BATCH_SIZE: usize = 1000;

/// Deletes objects in batches of up to [`MAX_BATCH_SIZE`].
pub struct BatchDeleter {
    target: Storage,
    executor: DeletionExecutor,
    force: bool,
    force_retry_config: ForceRetryConfig,
    cancellation_token: PipelineCancellationToken,
}

impl BatchDeleter {
    pub fn new(
        target: Storage,
        executor: DeletionExecutor,
        force: bool,
        force_retry_config: ForceRetryConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            target,
            executor,
            force,
            force_retry_config,
            cancellation_token,
        }
    }

    async fn retry_individually(&self, object: &ObjectVersionRef) -> DeletionOutcome {
        delete_with_retries(
            &self.executor,
            object,
            self.force,
            &self.force_retry_config,
            &self.cancellation_token,
        )
        .await
    }

    /// Add a resolved outcome to `result`. Breaks when the token was
    /// cancelled, fails when the bucket is gone.
    fn record(
        &self,
        result: &mut DeleteResult,
        outcome: DeletionOutcome,
    ) -> Result<ControlFlow<()>> {
        if is_cancelled_outcome(&outcome) {
            debug!(
                bucket = self.target.bucket(),
                "batch deletion cancelled."
            );
            return Ok(ControlFlow::Break(()));
        }
        if is_bucket_missing_outcome(&outcome) {
            error!(
                bucket = self.target.bucket(),
                "bucket disappeared during DeleteObjects."
            );
            return Err(anyhow!(S3emptyError::BucketNotFound(
                self.target.bucket().to_string()
            )));
        }
        result.push(outcome);
        Ok(ControlFlow::Continue(()))
    }

    async fn resolve_error_entry(&self, entry: BatchDeleteError) -> DeletionOutcome {
        match classify_error_code(&entry.code) {
            ErrorKind::NotFound if entry.code == "NoSuchBucket" => DeletionOutcome::failure(
                entry.object,
                ErrorKind::NotFound,
                format!("{}: {}", entry.code, entry.message),
            ),
            ErrorKind::NotFound => DeletionOutcome::success(entry.object, false),
            ErrorKind::AccessDenied => {
                self.executor
                    .resolve_access_denied(
                        &entry.object,
                        self.force,
                        format!("{}: {}", entry.code, entry.message),
                    )
                    .await
            }
            ErrorKind::Transient => {
                debug!(
                    key = entry.object.key,
                    version_id = entry.object.version_id,
                    code = entry.code,
                    "retryable DeleteObjects error, falling back to DeleteObject."
                );
                self.retry_individually(&entry.object).await
            }
            kind => {
                warn!(
                    key = entry.object.key,
                    version_id = entry.object.version_id,
                    code = entry.code,
                    message = entry.message,
                    "S3 DeleteObjects partial failure for '{}': {} ({}).",
                    entry.object,
                    entry.code,
                    entry.message,
                );
                DeletionOutcome::failure(
                    entry.object,
                    kind,
                    format!("{}: {}", entry.code, entry.message),
                )
            }
        }
    }
}

#[async_trait]
impl Deleter for BatchDeleter {
    async fn delete(&self, objects: &[ObjectVersionRef]) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        for chunk in objects.chunks(MAX_BATCH_SIZE) {
            if self.cancellation_token.is_cancelled() {
                debug!(
                    bucket = self.target.bucket(),
                    "batch deletion cancelled."
                );
                return Ok(result);
            }

            debug!(
                batch_size = chunk.len(),
                "sending DeleteObjects batch request."
            );

            let response = match self
                .target
                .delete_objects(chunk.to_vec(), true, self.force)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let code = error_code(&e);
                    match classify_error(&e) {
                        ErrorKind::NotFound if code == "NoSuchBucket" => {
                            error!(
                                bucket = self.target.bucket(),
                                "bucket disappeared during DeleteObjects."
                            );
                            return Err(e);
                        }
                        ErrorKind::Transient => {
                            warn!(
                                batch_size = chunk.len(),
                                code = code,
                                "DeleteObjects request failed, retrying members individually."
                            );
                            for object in chunk {
                                let outcome = self.retry_individually(object).await;
                                if self.record(&mut result, outcome)?.is_break() {
                                    return Ok(result);
                                }
                            }
                        }
                        kind => {
                            warn!(
                                batch_size = chunk.len(),
                                code = code,
                                error = format!("{e:#}"),
                                "DeleteObjects request failed for the whole batch."
                            );
                            for object in chunk {
                                result.push(DeletionOutcome::failure(
                                    object.clone(),
                                    kind,
                                    format!("{e:#}"),
                                ));
                            }
                        }
                    }
                    continue;
                }
            };

            let failed: HashSet<ObjectVersionRef> = response
                .errors
                .iter()
                .map(|entry| entry.object.clone())
                .collect();
            for object in chunk.iter().filter(|object| !failed.contains(*object)) {
                result.push(DeletionOutcome::success(object.clone(), false));
            }
            for entry in response.errors {
                let outcome = self.resolve_error_entry(entry).await;
                if self.record(&mut result, outcome)?.is_break() {
                    return Ok(result);
                }
            }

            debug!(
                deleted = result.deleted.len(),
                failed = result.failed.len(),
                "DeleteObjects batch completed."
            );
        }

        Ok(result)
    }
}
