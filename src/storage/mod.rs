use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use dyn_clone::DynClone;

use crate::config::Config;
use crate::types::{
    BatchDeleteResponse, LegalHoldStatus, LifecycleRuleSummary, ListCursor, ListPage,
    ObjectVersionRef, VersioningStatus,
};

pub mod s3;

pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Object-storage operations consumed by the erase and convergence engine.
///
/// A storage instance is bound to a single bucket. Every failed service
/// call is returned as an `anyhow::Error` wrapping an
/// [`ApiError`](crate::types::error::ApiError), so callers classify
/// failures with [`classify_error`](crate::types::error::classify_error).
#[async_trait]
pub trait StorageTrait: DynClone {
    fn bucket(&self) -> &str;

    /// Returns true if this is an Express One Zone (directory) bucket.
    fn is_express_onezone_storage(&self) -> bool;

    /// Whether the multi-object delete API can be used.
    fn supports_batch_delete(&self) -> bool;

    /// Fetch one page of current objects.
    ///
    /// `cursor` is the `next` value of the previous page, `None` for the
    /// first page.
    async fn list_objects(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage>;

    /// Fetch one page of the version history.
    ///
    /// The page holds the object versions followed by the delete markers.
    async fn list_object_versions(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage>;

    async fn delete_object(
        &self,
        key: &str,
        version_id: Option<String>,
        bypass_governance_retention: bool,
    ) -> Result<()>;

    /// Delete up to 1000 objects in a single request.
    ///
    /// A request-level failure is returned as `Err`; per-object failures are
    /// reported in [`BatchDeleteResponse::errors`].
    async fn delete_objects(
        &self,
        objects: Vec<ObjectVersionRef>,
        quiet: bool,
        bypass_governance_retention: bool,
    ) -> Result<BatchDeleteResponse>;

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<LegalHoldStatus>;

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: LegalHoldStatus,
    ) -> Result<()>;

    async fn get_bucket_versioning_status(&self) -> Result<VersioningStatus>;

    async fn get_bucket_lifecycle_rules(&self) -> Result<Vec<LifecycleRuleSummary>>;

    async fn head_bucket(&self) -> Result<()>;

    async fn delete_bucket(&self) -> Result<()>;
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Create an S3 storage bound to the target bucket of `config`.
///
/// Without a client configuration the SDK default provider chains are used.
pub async fn create_storage(config: &Config) -> Storage {
    let client = match &config.target_client_config {
        Some(client_config) => client_config.create_client().await,
        None => Client::new(&aws_config::load_defaults(BehaviorVersion::latest()).await),
    };

    Box::new(s3::S3Storage::new(client, config.bucket()))
}
