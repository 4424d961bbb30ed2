pub mod client_builder;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{
    BucketVersioningStatus, Delete, ExpirationStatus, ObjectIdentifier, ObjectLockLegalHold,
    ObjectLockLegalHoldStatus,
};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

use crate::storage::StorageTrait;
use crate::types::error::ApiError;
use crate::types::{
    BatchDeleteError, BatchDeleteResponse, LegalHoldStatus, LifecycleRuleSummary, ListCursor,
    ListPage, ObjectVersionRef, VersioningStatus,
};

const EXPRESS_ONEZONE_STORAGE_SUFFIX: &str = "--x-s3";

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "InternalError") and the human-readable error
/// message from the response. For other error types (network, timeout,
/// construction failure), returns "N/A" as the code and the full error
/// description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

fn to_api_error<E: std::fmt::Display + ProvideErrorMetadata>(e: &SdkError<E>) -> ApiError {
    let (code, message) = extract_sdk_error_details(e);
    let api_error = ApiError::new(&code, &message);
    match e.raw_response() {
        Some(response) => api_error.with_status(response.status().as_u16()),
        None => api_error,
    }
}

/// The response S3 returns for a legal-hold read on a bucket without
/// Object Lock.
fn is_object_lock_not_configured(api_error: &ApiError) -> bool {
    api_error.code == "ObjectLockConfigurationNotFoundError"
        || (api_error.code == "InvalidRequest" && api_error.message.contains("Object Lock"))
}

/// S3 storage bound to one bucket.
#[derive(Clone)]
pub struct S3Storage {
    bucket: String,
    client: Arc<Client>,
}

impl S3Storage {
    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn is_express_onezone_storage(&self) -> bool {
        is_express_onezone_bucket(&self.bucket)
    }

    fn supports_batch_delete(&self) -> bool {
        true
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let continuation_token = match cursor {
            Some(ListCursor::ContinuationToken(token)) => Some(token),
            _ => None,
        };

        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(prefix.map(String::from))
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = prefix,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    prefix.unwrap_or_default(),
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::list_objects_v2() failed.")
            })?;

        let items = output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(ObjectVersionRef::current)
            .collect();

        let next = if output.is_truncated() == Some(true) {
            output
                .next_continuation_token()
                .map(|token| ListCursor::ContinuationToken(token.to_string()))
        } else {
            None
        };

        Ok(ListPage { items, next })
    }

    async fn list_object_versions(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let (key_marker, version_id_marker) = match cursor {
            Some(ListCursor::VersionMarker {
                key_marker,
                version_id_marker,
            }) => (key_marker, version_id_marker),
            _ => (None, None),
        };

        let output = self
            .client
            .list_object_versions()
            .bucket(&self.bucket)
            .set_prefix(prefix.map(String::from))
            .set_key_marker(key_marker)
            .set_version_id_marker(version_id_marker)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = prefix,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 ListObjectVersions API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    prefix.unwrap_or_default(),
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::list_object_versions() failed.")
            })?;

        let versions = output.versions().iter().filter_map(|version| {
            Some(ObjectVersionRef::version(
                version.key()?,
                version.version_id().unwrap_or("null"),
            ))
        });
        let delete_markers = output.delete_markers().iter().filter_map(|marker| {
            Some(ObjectVersionRef::delete_marker(
                marker.key()?,
                marker.version_id().unwrap_or("null"),
            ))
        });
        let items = versions.chain(delete_markers).collect();

        let next = if output.is_truncated() == Some(true) {
            Some(ListCursor::VersionMarker {
                key_marker: output.next_key_marker().map(String::from),
                version_id_marker: output.next_version_id_marker().map(String::from),
            })
        } else {
            None
        };

        Ok(ListPage { items, next })
    }

    async fn delete_object(
        &self,
        key: &str,
        version_id: Option<String>,
        bypass_governance_retention: bool,
    ) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .set_bypass_governance_retention(bypass_governance_retention.then_some(true))
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::delete_object() failed.")
            })?;

        Ok(())
    }

    async fn delete_objects(
        &self,
        objects: Vec<ObjectVersionRef>,
        quiet: bool,
        bypass_governance_retention: bool,
    ) -> Result<BatchDeleteResponse> {
        let object_count = objects.len();

        let identifiers = objects
            .iter()
            .map(|object| {
                ObjectIdentifier::builder()
                    .key(&object.key)
                    .set_version_id(object.version_id.clone())
                    .build()
                    .context("Failed to build ObjectIdentifier")
            })
            .collect::<Result<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(quiet)
            .build()
            .context("Failed to build Delete request")?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .set_bypass_governance_retention(bypass_governance_retention.then_some(true))
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::error!(
                    bucket = self.bucket,
                    object_count = object_count,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 DeleteObjects API call failed for {} objects in s3://{}: {} ({}).",
                    object_count,
                    self.bucket,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::delete_objects() failed.")
            })?;

        let find_requested = |key: &str, version_id: Option<&str>| {
            objects
                .iter()
                .find(|object| object.key == key && object.version_id() == version_id)
                .cloned()
                .unwrap_or_else(|| ObjectVersionRef {
                    key: key.to_string(),
                    version_id: version_id.map(String::from),
                    is_delete_marker: false,
                })
        };

        let deleted = output
            .deleted()
            .iter()
            .filter_map(|deleted| Some(find_requested(deleted.key()?, deleted.version_id())))
            .collect();

        let errors = output
            .errors()
            .iter()
            .filter_map(|error| {
                Some(BatchDeleteError {
                    object: find_requested(error.key()?, error.version_id()),
                    code: error.code().unwrap_or("unknown").to_string(),
                    message: error.message().unwrap_or("no message").to_string(),
                })
            })
            .collect();

        Ok(BatchDeleteResponse { deleted, errors })
    }

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<LegalHoldStatus> {
        let result = self
            .client
            .get_object_legal_hold()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let api_error = to_api_error(&e);
                if is_object_lock_not_configured(&api_error) {
                    return Ok(LegalHoldStatus::Off);
                }
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 GetObjectLegalHold API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    api_error.code,
                    api_error.message,
                );
                return Err(anyhow!(api_error)
                    .context("aws_sdk_s3::client::get_object_legal_hold() failed."));
            }
        };

        let status = output
            .legal_hold()
            .and_then(|legal_hold| legal_hold.status());
        if status == Some(&ObjectLockLegalHoldStatus::On) {
            Ok(LegalHoldStatus::On)
        } else {
            Ok(LegalHoldStatus::Off)
        }
    }

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: LegalHoldStatus,
    ) -> Result<()> {
        let legal_hold_status = match status {
            LegalHoldStatus::On => ObjectLockLegalHoldStatus::On,
            LegalHoldStatus::Off => ObjectLockLegalHoldStatus::Off,
        };

        self.client
            .put_object_legal_hold()
            .bucket(&self.bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .legal_hold(
                ObjectLockLegalHold::builder()
                    .status(legal_hold_status)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 PutObjectLegalHold API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::put_object_legal_hold() failed.")
            })?;

        Ok(())
    }

    async fn get_bucket_versioning_status(&self) -> Result<VersioningStatus> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::error!(
                    bucket = self.bucket,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 GetBucketVersioning API call failed for bucket '{}': {} ({}).",
                    self.bucket,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::get_bucket_versioning() failed.")
            })?;

        Ok(match output.status() {
            Some(BucketVersioningStatus::Enabled) => VersioningStatus::Enabled,
            Some(BucketVersioningStatus::Suspended) => VersioningStatus::Suspended,
            _ => VersioningStatus::Disabled,
        })
    }

    async fn get_bucket_lifecycle_rules(&self) -> Result<Vec<LifecycleRuleSummary>> {
        let output = self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::debug!(
                    bucket = self.bucket,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 GetBucketLifecycleConfiguration API call failed for bucket '{}': {} ({}).",
                    self.bucket,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error)
                    .context("aws_sdk_s3::client::get_bucket_lifecycle_configuration() failed.")
            })?;

        Ok(output
            .rules()
            .iter()
            .map(|rule| LifecycleRuleSummary {
                id: rule.id().unwrap_or_default().to_string(),
                enabled: matches!(rule.status(), ExpirationStatus::Enabled),
            })
            .collect())
    }

    async fn head_bucket(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::debug!(
                    bucket = self.bucket,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 HeadBucket API call failed for bucket '{}': {} ({}).",
                    self.bucket,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::head_bucket() failed.")
            })?;

        Ok(())
    }

    async fn delete_bucket(&self) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                let api_error = to_api_error(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    s3_error_code = api_error.code,
                    s3_error_message = api_error.message,
                    "S3 DeleteBucket API call failed for bucket '{}': {} ({}).",
                    self.bucket,
                    api_error.code,
                    api_error.message,
                );
                anyhow!(api_error).context("aws_sdk_s3::client::delete_bucket() failed.")
            })?;

        Ok(())
    }
}

/// Express One Zone bucket names end with `--x-s3`.
fn is_express_onezone_bucket(bucket: &str) -> bool {
    bucket.ends_with(EXPRESS_ONEZONE_STORAGE_SUFFIX)
}
