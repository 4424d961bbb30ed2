use anyhow::Error;
use thiserror::Error;

use crate::types::ErrorKind;

/// Application-level error types for s3empty-rs.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Cancelled
/// - 1: General errors (AwsSdk, BucketNotFound, ListingFailed, BucketNotEmpty, ...)
/// - 2: Configuration errors (InvalidConfig)
/// - 3: Incomplete runs that reported progress (PartialFailure, Timeout, WaitTimeout)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum S3emptyError {
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Listing failed: {0}")]
    ListingFailed(String),

    /// `protected` counts the failures caused by a legal hold while `force`
    /// was not set; it is included in `failed`.
    #[error(
        "Partial failure: {deleted} deleted, {failed} failed, {protected} protected by a legal hold (last error: {last_error})"
    )]
    PartialFailure {
        deleted: u64,
        failed: u64,
        protected: u64,
        last_error: String,
    },

    /// DeleteBucket kept reporting a non-empty bucket although erasing it
    /// found nothing left to delete.
    #[error("Bucket is still not empty after {attempts} erase attempts: {bucket}")]
    BucketNotEmpty { bucket: String, attempts: u32 },

    #[error("Erase deadline exceeded after {deleted} deletions")]
    Timeout { deleted: u64 },

    #[error("Timed out after {attempts} attempts waiting for state (last: {last_status})")]
    WaitTimeout { attempts: u32, last_status: String },

    #[error("Unexpected state '{status}', wanted one of {target}")]
    UnexpectedState { status: String, target: String },

    #[error("Resource not found after {checks} checks")]
    NotFoundAfterGrace { checks: u32 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl S3emptyError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3emptyError::Cancelled => 0,
            S3emptyError::InvalidConfig(_) => 2,
            S3emptyError::PartialFailure { .. }
            | S3emptyError::Timeout { .. }
            | S3emptyError::WaitTimeout { .. } => 3,
            _ => 1,
        }
    }
}

/// A service error returned by the object-storage API.
///
/// Storage implementations wrap every failed call in this type so that the
/// engine can classify errors without knowing the SDK error types.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchBucket",
    "NoSuchKey",
    "NotFound",
    "NoSuchVersion",
    "NoSuchLifecycleConfiguration",
];

const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "SlowDown",
    "ServiceUnavailable",
    "RequestTimeout",
    "Throttling",
    "ThrottlingException",
    "OperationAborted",
];

/// Classify an S3 error code (as found in batch delete error entries).
pub fn classify_error_code(code: &str) -> ErrorKind {
    if NOT_FOUND_CODES.contains(&code) {
        ErrorKind::NotFound
    } else if code == "AccessDenied" {
        ErrorKind::AccessDenied
    } else if TRANSIENT_CODES.contains(&code) {
        ErrorKind::Transient
    } else {
        ErrorKind::Other
    }
}

/// Classify an error returned by a storage call.
pub fn classify_error(e: &Error) -> ErrorKind {
    if is_cancelled_error(e) {
        return ErrorKind::Cancelled;
    }

    let Some(api_error) = e.downcast_ref::<ApiError>() else {
        return ErrorKind::Other;
    };

    match classify_error_code(&api_error.code) {
        ErrorKind::Other => match api_error.status {
            Some(404) => ErrorKind::NotFound,
            Some(403) => ErrorKind::AccessDenied,
            Some(status) if status >= 500 => ErrorKind::Transient,
            _ => ErrorKind::Other,
        },
        kind => kind,
    }
}

/// The S3 error code carried by `e`, or "N/A" for non-service errors.
pub fn error_code(e: &Error) -> String {
    e.downcast_ref::<ApiError>()
        .map(|api_error| api_error.code.clone())
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn is_not_found_error(e: &Error) -> bool {
    classify_error(e) == ErrorKind::NotFound
}

pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3emptyError>() {
        return *err == S3emptyError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3emptyError>() {
        return err.exit_code();
    }
    1
}
