//! Bulk erase of a bucket, or a prefix inside it.
//!
//! Each iteration lists a fresh batch of candidates, deletes it and
//! accumulates the outcome. The run ends when a listing yields nothing new,
//! the deadline passes, or the token is cancelled.

use std::collections::HashSet;

use anyhow::{Error, anyhow};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::deleter::{batch::MAX_BATCH_SIZE, create_deleter};
use crate::lister::VersionEnumerator;
use crate::storage::Storage;
use crate::types::error::{S3emptyError, classify_error, is_cancelled_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{ErrorKind, ObjectVersionRef, ProgressEvent, ProgressSink, report};

/// Outcome of one erase run.
///
/// Counts are always populated, including when `error` is set, so callers
/// can tell how far a failed run got.
#[derive(Debug, Default)]
pub struct EraseResult {
    pub deleted_count: u64,
    pub failed_count: u64,
    pub error: Option<Error>,
}

impl EraseResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn fatal(deleted_count: u64, failed_count: u64, error: S3emptyError) -> Self {
        Self {
            deleted_count,
            failed_count,
            error: Some(anyhow!(error)),
        }
    }
}

/// Erases every object version under the configured target.
///
/// The versioning status is read once per run and decides whether the
/// whole run lists current objects or the full version history.
pub struct BulkEraser {
    storage: Storage,
    config: Config,
    cancellation_token: PipelineCancellationToken,
    progress: Option<ProgressSink>,
}

impl BulkEraser {
    pub fn new(
        storage: Storage,
        config: Config,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            cancellation_token,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn erase(&self) -> EraseResult {
        if let Err(message) = self.validate() {
            error!(bucket = self.config.bucket(), message);
            return EraseResult::fatal(0, 0, S3emptyError::InvalidConfig(message));
        }

        let deadline = Instant::now() + self.config.timeout;

        let versioned = match self.detect_versioning().await {
            Ok(versioned) => versioned,
            Err(e) => return EraseResult::fatal(0, 0, e),
        };

        info!(
            bucket = self.config.bucket(),
            prefix = self.config.prefix(),
            versioned = versioned,
            batch_size = self.config.batch_size,
            force = self.config.force,
            "erase has started."
        );

        let deleter = create_deleter(
            self.storage.clone(),
            &self.config,
            self.progress.clone(),
            self.cancellation_token.clone(),
        );
        let mut skipped: HashSet<ObjectVersionRef> = HashSet::new();
        let mut deleted_count = 0u64;
        let mut failed_count = 0u64;
        let mut protected_count = 0u64;
        let mut last_error: Option<String> = None;

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(deleted = deleted_count, "erase has been cancelled.");
                return EraseResult::fatal(deleted_count, failed_count, S3emptyError::Cancelled);
            }
            if Instant::now() >= deadline {
                warn!(
                    bucket = self.config.bucket(),
                    deleted = deleted_count,
                    "erase deadline exceeded."
                );
                return EraseResult::fatal(
                    deleted_count,
                    failed_count,
                    S3emptyError::Timeout {
                        deleted: deleted_count,
                    },
                );
            }

            let candidates = match self.collect_candidates(versioned, &skipped).await {
                Ok(candidates) => candidates,
                Err(e) if is_cancelled_error(&e) => {
                    return EraseResult::fatal(
                        deleted_count,
                        failed_count,
                        S3emptyError::Cancelled,
                    );
                }
                Err(e) => {
                    error!(
                        bucket = self.config.bucket(),
                        error = format!("{e:#}"),
                        "listing failed."
                    );
                    return EraseResult::fatal(
                        deleted_count,
                        failed_count,
                        S3emptyError::ListingFailed(format!("{e:#}")),
                    );
                }
            };

            if candidates.is_empty() {
                break;
            }

            let result = match deleter.delete(&candidates).await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        bucket = self.config.bucket(),
                        error = format!("{e:#}"),
                        "bucket disappeared during erase."
                    );
                    return EraseResult::fatal(
                        deleted_count,
                        failed_count,
                        S3emptyError::BucketNotFound(self.config.bucket().to_string()),
                    );
                }
            };

            for object in &result.deleted {
                report(
                    &self.progress,
                    ProgressEvent::ObjectDeleted {
                        key: object.key.clone(),
                        version_id: object.version_id.clone(),
                    },
                )
                .await;
            }
            deleted_count += result.deleted.len() as u64;

            for outcome in result.failed {
                report(
                    &self.progress,
                    ProgressEvent::DeleteFailed {
                        key: outcome.object.key.clone(),
                        version_id: outcome.object.version_id.clone(),
                        error_code: outcome
                            .error_kind
                            .map_or_else(|| "Unknown".to_string(), |kind| format!("{kind:?}")),
                    },
                )
                .await;
                failed_count += 1;
                if outcome.error_kind == Some(ErrorKind::Protected) {
                    protected_count += 1;
                }
                last_error = Some(format!(
                    "{}: {}",
                    outcome.object,
                    outcome.error_message.as_deref().unwrap_or("unknown error")
                ));
                skipped.insert(outcome.object);
            }

            report(
                &self.progress,
                ProgressEvent::BatchCompleted {
                    deleted_so_far: deleted_count,
                },
            )
            .await;

            debug!(
                candidates = candidates.len(),
                deleted = deleted_count,
                failed = failed_count,
                bypassed = result.bypassed,
                "erase batch completed."
            );
        }

        info!(
            bucket = self.config.bucket(),
            deleted = deleted_count,
            failed = failed_count,
            protected = protected_count,
            "erase has been completed."
        );

        match last_error {
            Some(last_error) => EraseResult::fatal(
                deleted_count,
                failed_count,
                S3emptyError::PartialFailure {
                    deleted: deleted_count,
                    failed: failed_count,
                    protected: protected_count,
                    last_error,
                },
            ),
            None => EraseResult {
                deleted_count,
                failed_count,
                error: None,
            },
        }
    }

    fn validate(&self) -> Result<(), String> {
        validate_bucket_name(self.config.bucket())?;

        let batch_size = self.config.batch_size as usize;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(format!(
                "batch size must be between 1 and {MAX_BATCH_SIZE}: {batch_size}"
            ));
        }
        if self.config.timeout.is_zero() {
            return Err("timeout must be greater than zero.".to_string());
        }
        Ok(())
    }

    async fn detect_versioning(&self) -> Result<bool, S3emptyError> {
        if self.storage.is_express_onezone_storage() {
            debug!(
                bucket = self.config.bucket(),
                "express one zone bucket, listing without versions."
            );
            return Ok(false);
        }

        match self.storage.get_bucket_versioning_status().await {
            Ok(status) => Ok(status.has_version_history()),
            Err(e) => match classify_error(&e) {
                ErrorKind::NotFound => {
                    Err(S3emptyError::BucketNotFound(self.config.bucket().to_string()))
                }
                ErrorKind::Cancelled => Err(S3emptyError::Cancelled),
                _ => Err(S3emptyError::AwsSdk(format!("{e:#}"))),
            },
        }
    }

    /// List up to `batch_size` candidates from a fresh enumeration, skipping
    /// versions that already failed permanently in this run.
    async fn collect_candidates(
        &self,
        versioned: bool,
        skipped: &HashSet<ObjectVersionRef>,
    ) -> anyhow::Result<Vec<ObjectVersionRef>> {
        let batch_size = self.config.batch_size as usize;
        let max_keys = self.config.max_keys.clamp(1, batch_size as i32);
        let mut lister = VersionEnumerator::new(
            self.storage.clone(),
            self.config.prefix(),
            versioned,
            max_keys,
            self.cancellation_token.clone(),
        );

        let mut candidates = Vec::with_capacity(batch_size);
        while candidates.len() < batch_size && !lister.is_exhausted() {
            let listed = lister.next_batch(batch_size - candidates.len()).await?;
            candidates.extend(listed.into_iter().filter(|object| !skipped.contains(object)));
        }
        Ok(candidates)
    }
}

/// Check S3 bucket naming rules.
///
/// 3 to 63 characters of lowercase letters, digits, dots and hyphens,
/// starting and ending with a letter or digit.
pub fn validate_bucket_name(bucket: &str) -> Result<(), String> {
    let length = bucket.len();
    if !(3..=63).contains(&length) {
        return Err(format!(
            "bucket name must be between 3 and 63 characters long: {bucket}"
        ));
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(format!(
            "bucket name may only contain lowercase letters, digits, dots and hyphens: {bucket}"
        ));
    }

    let is_alphanumeric = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !is_alphanumeric(bucket.chars().next()) || !is_alphanumeric(bucket.chars().last()) {
        return Err(format!(
            "bucket name must begin and end with a letter or digit: {bucket}"
        ));
    }
    Ok(())
}
