use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use async_channel::Sender;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

/// One deletable unit in a bucket.
///
/// `version_id == None` addresses the current (or unversioned) object.
/// Values are produced by the [`VersionEnumerator`](crate::lister::VersionEnumerator)
/// and consumed once by a delete call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersionRef {
    pub key: String,
    pub version_id: Option<String>,
    pub is_delete_marker: bool,
}

impl ObjectVersionRef {
    pub fn current(key: &str) -> Self {
        Self {
            key: key.to_string(),
            version_id: None,
            is_delete_marker: false,
        }
    }

    pub fn version(key: &str, version_id: &str) -> Self {
        Self {
            key: key.to_string(),
            version_id: Some(version_id.to_string()),
            is_delete_marker: false,
        }
    }

    pub fn delete_marker(key: &str, version_id: &str) -> Self {
        Self {
            key: key.to_string(),
            version_id: Some(version_id.to_string()),
            is_delete_marker: true,
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_deref()
    }
}

impl fmt::Display for ObjectVersionRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(version_id) => write!(f, "{} (version {})", self.key, version_id),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Classification of a single storage call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bucket, key, version or configuration does not exist.
    NotFound,
    /// Permission denied without an active legal hold.
    AccessDenied,
    /// The object version carries an active legal hold.
    Protected,
    /// Throttling, timeouts and 5xx responses.
    Transient,
    Cancelled,
    Other,
}

/// Per-object result reported by the [`DeletionExecutor`](crate::deleter::DeletionExecutor).
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionOutcome {
    pub object: ObjectVersionRef,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// A legal hold was cleared to permit this deletion.
    pub bypassed: bool,
}

impl DeletionOutcome {
    pub fn success(object: ObjectVersionRef, bypassed: bool) -> Self {
        Self {
            object,
            succeeded: true,
            error_kind: None,
            error_message: None,
            bypassed,
        }
    }

    pub fn failure(object: ObjectVersionRef, kind: ErrorKind, message: String) -> Self {
        Self {
            object,
            succeeded: false,
            error_kind: Some(kind),
            error_message: Some(message),
            bypassed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersioningStatus {
    Enabled,
    Suspended,
    /// Versioning has never been enabled on the bucket.
    Disabled,
}

impl VersioningStatus {
    /// Whether the bucket may hold historical versions or delete markers.
    pub fn has_version_history(&self) -> bool {
        matches!(self, Self::Enabled | Self::Suspended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalHoldStatus {
    On,
    Off,
}

/// The part of a lifecycle rule that convergence checks compare.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LifecycleRuleSummary {
    pub id: String,
    pub enabled: bool,
}

/// Opaque pagination cursor returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListCursor {
    ContinuationToken(String),
    VersionMarker {
        key_marker: Option<String>,
        version_id_marker: Option<String>,
    },
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub items: Vec<ObjectVersionRef>,
    /// `None` when this is the last page.
    pub next: Option<ListCursor>,
}

/// A per-object error entry of a batch delete response.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDeleteError {
    pub object: ObjectVersionRef,
    pub code: String,
    pub message: String,
}

/// Response of a quiet-mode batch delete.
///
/// In quiet mode `deleted` is empty; every member absent from `errors`
/// was deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDeleteResponse {
    pub deleted: Vec<ObjectVersionRef>,
    pub errors: Vec<BatchDeleteError>,
}

/// Advisory progress notifications emitted by long-running operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ObjectDeleted {
        key: String,
        version_id: Option<String>,
    },
    DeleteFailed {
        key: String,
        version_id: Option<String>,
        error_code: String,
    },
    LegalHoldCleared {
        key: String,
        version_id: Option<String>,
    },
    BatchCompleted {
        deleted_so_far: u64,
    },
    PollAttempt {
        attempt: u32,
        status: String,
    },
}

/// Caller-supplied channel receiving [`ProgressEvent`]s.
pub type ProgressSink = Sender<ProgressEvent>;

pub(crate) async fn report(sink: &Option<ProgressSink>, event: ProgressEvent) {
    if let Some(sender) = sink {
        let _ = sender.send(event).await;
    }
}

/// S3 storage path specification.
#[derive(Debug, Clone)]
pub enum StoragePath {
    S3 { bucket: String, prefix: String },
}

/// AWS configuration file locations.
#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair.
///
/// The secret_access_key and session_token are cleared from memory
/// when this struct is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
