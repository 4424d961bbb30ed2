//! Single object version deletion with legal-hold handling.

use tracing::{debug, info, warn};

use crate::storage::Storage;
use crate::types::error::{classify_error, error_code};
use crate::types::{
    DeletionOutcome, ErrorKind, LegalHoldStatus, ObjectVersionRef, ProgressEvent, ProgressSink,
    report,
};

/// Deletes one object version and classifies the outcome.
///
/// - A missing key or version counts as deleted. A missing bucket is
///   reported as an [`ErrorKind::NotFound`] failure so the caller can stop.
/// - An access denial is resolved by reading the legal hold of the version.
///   An active hold yields [`ErrorKind::Protected`] unless `force` is set, in
///   which case the hold is cleared and the delete is retried exactly once.
///   A denial without an active hold is reported as
///   [`ErrorKind::AccessDenied`] and the hold is never written.
/// - Any other error is reported as is; retry policy belongs to the caller.
///
/// With `force` every delete request also bypasses governance retention.
#[derive(Clone)]
pub struct DeletionExecutor {
    storage: Storage,
    progress: Option<ProgressSink>,
}

impl DeletionExecutor {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn bucket(&self) -> &str {
        self.storage.bucket()
    }

    pub async fn delete(&self, object: &ObjectVersionRef, force: bool) -> DeletionOutcome {
        debug!(
            key = object.key,
            version_id = object.version_id,
            force = force,
            "sending DeleteObject request."
        );

        let error = match self
            .storage
            .delete_object(&object.key, object.version_id.clone(), force)
            .await
        {
            Ok(()) => return DeletionOutcome::success(object.clone(), false),
            Err(e) => e,
        };

        match classify_error(&error) {
            ErrorKind::NotFound if error_code(&error) == "NoSuchBucket" => DeletionOutcome::failure(
                object.clone(),
                ErrorKind::NotFound,
                format!("{error:#}"),
            ),
            ErrorKind::NotFound => {
                debug!(
                    key = object.key,
                    version_id = object.version_id,
                    "object already gone, treating as deleted."
                );
                DeletionOutcome::success(object.clone(), false)
            }
            ErrorKind::AccessDenied => {
                self.resolve_access_denied(object, force, format!("{error:#}"))
                    .await
            }
            kind => DeletionOutcome::failure(object.clone(), kind, format!("{error:#}")),
        }
    }

    /// Decide whether an access denial is caused by a legal hold and, under
    /// `force`, clear the hold and retry the delete once.
    pub(crate) async fn resolve_access_denied(
        &self,
        object: &ObjectVersionRef,
        force: bool,
        denial_message: String,
    ) -> DeletionOutcome {
        let hold = match self
            .storage
            .get_object_legal_hold(&object.key, object.version_id.clone())
            .await
        {
            Ok(hold) => hold,
            Err(e) => {
                if classify_error(&e) != ErrorKind::NotFound {
                    warn!(
                        key = object.key,
                        version_id = object.version_id,
                        error = format!("{e:#}"),
                        "legal hold read failed for '{}', reporting the access denial.",
                        object,
                    );
                }
                LegalHoldStatus::Off
            }
        };

        if hold == LegalHoldStatus::Off {
            return DeletionOutcome::failure(
                object.clone(),
                ErrorKind::AccessDenied,
                denial_message,
            );
        }

        if !force {
            warn!(
                key = object.key,
                version_id = object.version_id,
                "'{}' is protected by a legal hold. Use force to clear it.",
                object,
            );
            return DeletionOutcome::failure(
                object.clone(),
                ErrorKind::Protected,
                format!("legal hold is active: {denial_message}"),
            );
        }

        if let Err(e) = self
            .storage
            .put_object_legal_hold(
                &object.key,
                object.version_id.clone(),
                LegalHoldStatus::Off,
            )
            .await
        {
            return DeletionOutcome::failure(object.clone(), classify_error(&e), format!("{e:#}"));
        }

        info!(
            key = object.key,
            version_id = object.version_id,
            "legal hold cleared on '{}'.",
            object,
        );
        report(
            &self.progress,
            ProgressEvent::LegalHoldCleared {
                key: object.key.clone(),
                version_id: object.version_id.clone(),
            },
        )
        .await;

        match self
            .storage
            .delete_object(&object.key, object.version_id.clone(), true)
            .await
        {
            Ok(()) => DeletionOutcome::success(object.clone(), true),
            Err(e) => match classify_error(&e) {
                ErrorKind::NotFound => DeletionOutcome::success(object.clone(), true),
                kind => {
                    warn!(
                        key = object.key,
                        version_id = object.version_id,
                        error = format!("{e:#}"),
                        "delete still failing after clearing the legal hold on '{}'.",
                        object,
                    );
                    DeletionOutcome::failure(object.clone(), kind, format!("{e:#}"))
                }
            },
        }
    }
}
