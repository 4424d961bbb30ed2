//! Bucket deletion with optional force-destroy of its contents.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::eraser::BulkEraser;
use crate::storage::Storage;
use crate::types::error::{S3emptyError, error_code};
use crate::types::token::PipelineCancellationToken;
use crate::types::{ProgressSink, StoragePath};
use crate::waiter::{ConvergenceWaiter, DEFAULT_INITIAL_POLL_INTERVAL, DEFAULT_MAX_POLL_INTERVAL};

/// Consecutive erases that find nothing to delete while DeleteBucket still
/// reports `BucketNotEmpty` before giving up.
pub const MAX_EMPTY_ERASES: u32 = 5;

/// Deletes the target bucket of a [`Config`].
pub struct BucketDestroyer {
    storage: Storage,
    config: Config,
    cancellation_token: PipelineCancellationToken,
    progress: Option<ProgressSink>,
}

impl BucketDestroyer {
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

    /// Delete the bucket and wait until the deletion is visible.
    ///
    /// A bucket that is already gone counts as destroyed. A non-empty bucket
    /// is erased first when `force_destroy` is set, always as a whole even
    /// if the config names a prefix. Legal holds and governance retention
    /// are bypassed only when `object_lock_enabled` is also set. Everything,
    /// including the final wait, shares one deadline.
    ///
    /// An erase that deletes nothing is followed by a backoff before the
    /// next DeleteBucket. After [`MAX_EMPTY_ERASES`] of them in a row the
    /// destroy fails with [`S3emptyError::BucketNotEmpty`].
    ///
    /// Returns the number of object versions erased.
    pub async fn destroy(
        &self,
        force_destroy: bool,
        object_lock_enabled: bool,
        timeout: Duration,
    ) -> Result<u64> {
        let deadline = Instant::now() + timeout;
        let mut erased = 0u64;
        let mut empty_erases = 0u32;
        let mut interval = DEFAULT_INITIAL_POLL_INTERVAL;

        loop {
            if self.cancellation_token.is_cancelled() {
                return Err(anyhow!(S3emptyError::Cancelled));
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(S3emptyError::Timeout { deleted: erased }));
            }

            let error = match self.storage.delete_bucket().await {
                Ok(()) => break,
                Err(e) => e,
            };

            match error_code(&error).as_str() {
                "NoSuchBucket" => {
                    info!(
                        bucket = self.storage.bucket(),
                        "bucket does not exist, nothing to destroy."
                    );
                    return Ok(erased);
                }
                "BucketNotEmpty" if force_destroy => {
                    debug!(
                        bucket = self.storage.bucket(),
                        "bucket is not empty, erasing its contents."
                    );
                    if Instant::now() >= deadline {
                        return Err(anyhow!(S3emptyError::Timeout { deleted: erased }));
                    }
                    let deleted = self.erase_all(object_lock_enabled, deadline).await?;
                    erased += deleted;

                    if deleted > 0 {
                        empty_erases = 0;
                        interval = DEFAULT_INITIAL_POLL_INTERVAL;
                        continue;
                    }

                    empty_erases += 1;
                    if empty_erases >= MAX_EMPTY_ERASES {
                        warn!(
                            bucket = self.storage.bucket(),
                            attempts = empty_erases,
                            "bucket still reported as not empty with nothing left to erase."
                        );
                        return Err(anyhow!(S3emptyError::BucketNotEmpty {
                            bucket: self.storage.bucket().to_string(),
                            attempts: empty_erases,
                        }));
                    }

                    debug!(
                        bucket = self.storage.bucket(),
                        attempts = empty_erases,
                        interval_ms = interval.as_millis() as u64,
                        "erase found nothing to delete, retrying DeleteBucket after backoff."
                    );
                    let wake_at = (Instant::now() + interval).min(deadline);
                    tokio::select! {
                        _ = tokio::time::sleep_until(wake_at) => {}
                        _ = self.cancellation_token.cancelled() => {
                            return Err(anyhow!(S3emptyError::Cancelled));
                        }
                    }
                    interval = (interval * 2).min(DEFAULT_MAX_POLL_INTERVAL);
                }
                _ => return Err(error),
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait_result = ConvergenceWaiter::new(self.cancellation_token.clone())
            .with_progress(self.progress.clone())
            .wait_for_bucket_deleted(&self.storage, remaining)
            .await;
        if let Some(e) = wait_result.error {
            return Err(e);
        }

        info!(
            bucket = self.storage.bucket(),
            erased = erased,
            "bucket has been destroyed."
        );
        Ok(erased)
    }

    /// Erase every version in the bucket within what is left of `deadline`.
    async fn erase_all(&self, object_lock_enabled: bool, deadline: Instant) -> Result<u64> {
        let mut config = self.config.clone();
        config.target = StoragePath::S3 {
            bucket: self.config.bucket().to_string(),
            prefix: String::new(),
        };
        config.force = object_lock_enabled;
        config.timeout = deadline.saturating_duration_since(Instant::now());

        let result = BulkEraser::new(
            self.storage.clone(),
            config,
            self.cancellation_token.clone(),
        )
        .with_progress(self.progress.clone())
        .erase()
        .await;

        match result.error {
            Some(e) => {
                warn!(
                    bucket = self.storage.bucket(),
                    deleted = result.deleted_count,
                    "force destroy could not empty the bucket."
                );
                Err(e)
            }
            None => Ok(result.deleted_count),
        }
    }
}
