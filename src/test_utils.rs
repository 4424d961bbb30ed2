//! Shared test utilities for the s3empty library crate.
//!
//! [`MockStorage`] is an in-memory versioned bucket implementing
//! [`StorageTrait`]. It records every call, supports legal holds and
//! governance retention, and can inject per-key, listing and batch-level
//! failures.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::config::{Config, ForceRetryConfig};
use crate::storage::{Storage, StorageTrait};
use crate::types::error::ApiError;
use crate::types::{
    BatchDeleteError, BatchDeleteResponse, LegalHoldStatus, LifecycleRuleSummary, ListCursor,
    ListPage, ObjectVersionRef, StoragePath, VersioningStatus,
};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Create a default [`Config`] suitable for most unit tests.
///
/// Key defaults: bucket=`"test-bucket"`, whole-bucket target,
/// `batch_size=1000`, `timeout=60s`, no force retries.
pub(crate) fn make_test_config() -> Config {
    Config {
        target: StoragePath::S3 {
            bucket: "test-bucket".to_string(),
            prefix: String::new(),
        },
        force_retry_config: ForceRetryConfig {
            force_retry_count: 0,
            force_retry_interval_milliseconds: 0,
        },
        timeout: Duration::from_secs(60),
        ..Config::default()
    }
}

pub(crate) fn api_error(code: &str) -> anyhow::Error {
    anyhow!(ApiError::new(code, "injected by test"))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCall {
    ListObjects,
    ListObjectVersions,
    DeleteObject {
        key: String,
        version_id: Option<String>,
        bypass: bool,
    },
    DeleteObjects {
        count: usize,
        bypass: bool,
    },
    GetLegalHold {
        key: String,
        version_id: Option<String>,
    },
    PutLegalHold {
        key: String,
        version_id: Option<String>,
        status: LegalHoldStatus,
    },
    GetVersioning,
    GetLifecycle,
    HeadBucket,
    DeleteBucket,
}

#[derive(Debug, Clone)]
pub(crate) struct MockEntry {
    pub key: String,
    /// `None` for objects written while versioning was never enabled.
    pub version_id: Option<String>,
    pub is_delete_marker: bool,
    pub legal_hold: bool,
    pub governance_retained: bool,
}

impl MockEntry {
    fn to_version_ref(&self) -> ObjectVersionRef {
        ObjectVersionRef {
            key: self.key.clone(),
            version_id: self.version_id.clone(),
            is_delete_marker: self.is_delete_marker,
        }
    }
}

#[derive(Debug)]
pub(crate) struct MockBucketState {
    pub exists: bool,
    pub versioning: VersioningStatus,
    pub entries: Vec<MockEntry>,
    pub lifecycle_rules: Option<Vec<LifecycleRuleSummary>>,
    /// Keys whose deletion is denied regardless of legal holds.
    pub denied_keys: HashSet<String>,
    /// Errors returned (once each, in order) by delete calls for a key.
    pub injected_delete_errors: HashMap<String, VecDeque<String>>,
    /// Errors returned by the next legal-hold reads.
    pub injected_legal_hold_errors: VecDeque<String>,
    /// Fail the Nth listing call (1-based) with the given code.
    pub fail_listing_call: Option<(usize, String)>,
    /// Fail the next DeleteObjects requests with the given codes.
    pub fail_batch_requests: VecDeque<String>,
    /// Observations returned by versioning reads before the real state.
    pub versioning_observations: VecDeque<Result<VersioningStatus, String>>,
    /// Observations returned by lifecycle reads before the real state.
    pub lifecycle_observations: VecDeque<Result<Vec<LifecycleRuleSummary>, String>>,
    /// HeadBucket keeps succeeding this many times after DeleteBucket.
    pub stale_head_bucket_reads: u32,
    /// HeadBucket fails with NotFound this many times before succeeding.
    pub missing_head_bucket_reads: u32,
    /// DeleteBucket reports BucketNotEmpty this many times regardless of
    /// the entries.
    pub stale_bucket_not_empty: u32,
    /// Simulated latency of every DeleteObjects request.
    pub batch_latency: Duration,
    pub calls: Vec<MockCall>,
    next_version: u64,
    listing_calls: usize,
}

impl Default for MockBucketState {
    fn default() -> Self {
        Self {
            exists: true,
            versioning: VersioningStatus::Disabled,
            entries: Vec::new(),
            lifecycle_rules: None,
            denied_keys: HashSet::new(),
            injected_delete_errors: HashMap::new(),
            injected_legal_hold_errors: VecDeque::new(),
            fail_listing_call: None,
            fail_batch_requests: VecDeque::new(),
            versioning_observations: VecDeque::new(),
            lifecycle_observations: VecDeque::new(),
            stale_head_bucket_reads: 0,
            missing_head_bucket_reads: 0,
            stale_bucket_not_empty: 0,
            batch_latency: Duration::ZERO,
            calls: Vec::new(),
            next_version: 0,
            listing_calls: 0,
        }
    }
}

impl MockBucketState {
    fn new_version_id(&mut self) -> String {
        self.next_version += 1;
        format!("v{:04}", self.next_version)
    }

    fn check_listing_failure(&mut self) -> Result<()> {
        self.listing_calls += 1;
        match &self.fail_listing_call {
            Some((call, code)) if *call == self.listing_calls => Err(api_error(code)),
            _ => Ok(()),
        }
    }

    /// Delete one entry, with S3 semantics for legal holds, retention and
    /// unversioned deletes on versioned buckets.
    fn delete_entry(&mut self, key: &str, version_id: Option<&str>, bypass: bool) -> Result<()> {
        if !self.exists {
            return Err(api_error("NoSuchBucket"));
        }
        if let Some(code) = self
            .injected_delete_errors
            .get_mut(key)
            .and_then(|errors| errors.pop_front())
        {
            return Err(api_error(&code));
        }
        if self.denied_keys.contains(key) {
            return Err(api_error("AccessDenied"));
        }

        match version_id {
            None if self.versioning.has_version_history() => {
                let version_id = self.new_version_id();
                self.entries.push(MockEntry {
                    key: key.to_string(),
                    version_id: Some(version_id),
                    is_delete_marker: true,
                    legal_hold: false,
                    governance_retained: false,
                });
                Ok(())
            }
            _ => {
                let position = self
                    .entries
                    .iter()
                    .position(|entry| entry.key == key && entry.version_id.as_deref() == version_id);
                let Some(position) = position else {
                    return Ok(());
                };
                let entry = &self.entries[position];
                if entry.legal_hold || (entry.governance_retained && !bypass) {
                    return Err(api_error("AccessDenied"));
                }
                self.entries.remove(position);
                Ok(())
            }
        }
    }

    fn current_objects(&self, prefix: Option<&str>) -> Vec<ObjectVersionRef> {
        let mut latest: Vec<&MockEntry> = Vec::new();
        for entry in &self.entries {
            match latest.iter().position(|e| e.key == entry.key) {
                Some(index) => latest[index] = entry,
                None => latest.push(entry),
            }
        }
        latest
            .into_iter()
            .filter(|entry| !entry.is_delete_marker)
            .filter(|entry| prefix.is_none_or(|p| entry.key.starts_with(p)))
            .map(|entry| ObjectVersionRef::current(&entry.key))
            .collect()
    }

    fn all_versions(&self, prefix: Option<&str>) -> Vec<&MockEntry> {
        self.entries
            .iter()
            .filter(|entry| prefix.is_none_or(|p| entry.key.starts_with(p)))
            .collect()
    }
}

/// In-memory bucket shared between clones.
#[derive(Clone)]
pub(crate) struct MockStorage {
    bucket: String,
    express_onezone: bool,
    batch_support: bool,
    pub state: Arc<Mutex<MockBucketState>>,
}

impl MockStorage {
    pub fn new(versioning: VersioningStatus) -> Self {
        Self {
            bucket: "test-bucket".to_string(),
            express_onezone: false,
            batch_support: true,
            state: Arc::new(Mutex::new(MockBucketState {
                versioning,
                ..MockBucketState::default()
            })),
        }
    }

    pub fn express_onezone() -> Self {
        Self {
            bucket: "test-bucket--use1-az4--x-s3".to_string(),
            express_onezone: true,
            ..Self::new(VersioningStatus::Disabled)
        }
    }

    pub fn without_batch_support(mut self) -> Self {
        self.batch_support = false;
        self
    }

    pub fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    /// Write a new object version (or an unversioned object).
    pub fn put_object(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let version_id = if state.versioning.has_version_history() {
            Some(state.new_version_id())
        } else {
            state.entries.retain(|entry| entry.key != key);
            None
        };
        state.entries.push(MockEntry {
            key: key.to_string(),
            version_id: version_id.clone(),
            is_delete_marker: false,
            legal_hold: false,
            governance_retained: false,
        });
        version_id
    }

    pub fn put_delete_marker(&self, key: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let version_id = state.new_version_id();
        state.entries.push(MockEntry {
            key: key.to_string(),
            version_id: Some(version_id.clone()),
            is_delete_marker: true,
            legal_hold: false,
            governance_retained: false,
        });
        version_id
    }

    pub fn set_legal_hold(&self, key: &str, version_id: Option<&str>, on: bool) {
        let mut state = self.state.lock().unwrap();
        for entry in state.entries.iter_mut() {
            if entry.key == key && entry.version_id.as_deref() == version_id {
                entry.legal_hold = on;
            }
        }
    }

    pub fn set_governance_retention(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        for entry in state.entries.iter_mut().filter(|entry| entry.key == key) {
            entry.governance_retained = true;
        }
    }

    pub fn legal_hold_of(&self, key: &str, version_id: Option<&str>) -> Option<bool> {
        let state = self.state.lock().unwrap();
        state
            .entries
            .iter()
            .find(|entry| entry.key == key && entry.version_id.as_deref() == version_id)
            .map(|entry| entry.legal_hold)
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: MockCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn page<T: Clone>(items: &[T], cursor: Option<&str>, max_keys: i32) -> (Vec<T>, Option<usize>) {
    let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + max_keys.max(1) as usize).min(items.len());
    let slice = items.get(start..end).unwrap_or_default().to_vec();
    let next = (end < items.len()).then_some(end);
    (slice, next)
}

#[async_trait]
impl StorageTrait for MockStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn is_express_onezone_storage(&self) -> bool {
        self.express_onezone
    }

    fn supports_batch_delete(&self) -> bool {
        self.batch_support
    }

    async fn list_objects(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage> {
        self.record(MockCall::ListObjects);
        let mut state = self.state.lock().unwrap();
        if !state.exists {
            return Err(api_error("NoSuchBucket"));
        }
        state.check_listing_failure()?;

        let token = match &cursor {
            Some(ListCursor::ContinuationToken(token)) => Some(token.as_str()),
            _ => None,
        };
        let (items, next) = page(&state.current_objects(prefix), token, max_keys);
        Ok(ListPage {
            items,
            next: next.map(|n| ListCursor::ContinuationToken(n.to_string())),
        })
    }

    async fn list_object_versions(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage> {
        self.record(MockCall::ListObjectVersions);
        let mut state = self.state.lock().unwrap();
        if !state.exists {
            return Err(api_error("NoSuchBucket"));
        }
        state.check_listing_failure()?;

        let marker = match &cursor {
            Some(ListCursor::VersionMarker { key_marker, .. }) => key_marker.as_deref(),
            _ => None,
        };
        let versions: Vec<MockEntry> = state.all_versions(prefix).into_iter().cloned().collect();
        let (entries, next) = page(&versions, marker, max_keys);

        let (markers, versions): (Vec<MockEntry>, Vec<MockEntry>) =
            entries.into_iter().partition(|entry| entry.is_delete_marker);
        let items = versions
            .iter()
            .chain(markers.iter())
            .map(MockEntry::to_version_ref)
            .collect();

        Ok(ListPage {
            items,
            next: next.map(|n| ListCursor::VersionMarker {
                key_marker: Some(n.to_string()),
                version_id_marker: None,
            }),
        })
    }

    async fn delete_object(
        &self,
        key: &str,
        version_id: Option<String>,
        bypass_governance_retention: bool,
    ) -> Result<()> {
        self.record(MockCall::DeleteObject {
            key: key.to_string(),
            version_id: version_id.clone(),
            bypass: bypass_governance_retention,
        });
        self.state.lock().unwrap().delete_entry(
            key,
            version_id.as_deref(),
            bypass_governance_retention,
        )
    }

    async fn delete_objects(
        &self,
        objects: Vec<ObjectVersionRef>,
        quiet: bool,
        bypass_governance_retention: bool,
    ) -> Result<BatchDeleteResponse> {
        self.record(MockCall::DeleteObjects {
            count: objects.len(),
            bypass: bypass_governance_retention,
        });

        let latency = self.state.lock().unwrap().batch_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(code) = state.fail_batch_requests.pop_front() {
            return Err(api_error(&code));
        }

        let mut response = BatchDeleteResponse::default();
        for object in objects {
            match state.delete_entry(
                &object.key,
                object.version_id(),
                bypass_governance_retention,
            ) {
                Ok(()) => {
                    if !quiet {
                        response.deleted.push(object);
                    }
                }
                Err(e) => {
                    let code = crate::types::error::error_code(&e);
                    response.errors.push(BatchDeleteError {
                        object,
                        code,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(response)
    }

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<LegalHoldStatus> {
        self.record(MockCall::GetLegalHold {
            key: key.to_string(),
            version_id: version_id.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if let Some(code) = state.injected_legal_hold_errors.pop_front() {
            return Err(api_error(&code));
        }
        let entry = state
            .entries
            .iter()
            .find(|entry| entry.key == key && entry.version_id == version_id);
        match entry {
            Some(entry) if entry.legal_hold => Ok(LegalHoldStatus::On),
            Some(_) => Ok(LegalHoldStatus::Off),
            None => Err(api_error("NoSuchVersion")),
        }
    }

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: LegalHoldStatus,
    ) -> Result<()> {
        self.record(MockCall::PutLegalHold {
            key: key.to_string(),
            version_id: version_id.clone(),
            status,
        });
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .iter_mut()
            .find(|entry| entry.key == key && entry.version_id == version_id)
            .ok_or_else(|| api_error("NoSuchVersion"))?;
        entry.legal_hold = status == LegalHoldStatus::On;
        Ok(())
    }

    async fn get_bucket_versioning_status(&self) -> Result<VersioningStatus> {
        self.record(MockCall::GetVersioning);
        let mut state = self.state.lock().unwrap();
        if let Some(observation) = state.versioning_observations.pop_front() {
            return observation.map_err(|code| api_error(&code));
        }
        if !state.exists {
            return Err(api_error("NoSuchBucket"));
        }
        Ok(state.versioning)
    }

    async fn get_bucket_lifecycle_rules(&self) -> Result<Vec<LifecycleRuleSummary>> {
        self.record(MockCall::GetLifecycle);
        let mut state = self.state.lock().unwrap();
        if let Some(observation) = state.lifecycle_observations.pop_front() {
            return observation.map_err(|code| api_error(&code));
        }
        if !state.exists {
            return Err(api_error("NoSuchBucket"));
        }
        state
            .lifecycle_rules
            .clone()
            .ok_or_else(|| api_error("NoSuchLifecycleConfiguration"))
    }

    async fn head_bucket(&self) -> Result<()> {
        self.record(MockCall::HeadBucket);
        let mut state = self.state.lock().unwrap();
        if state.missing_head_bucket_reads > 0 {
            state.missing_head_bucket_reads -= 1;
            return Err(anyhow!(ApiError::new("NotFound", "Not Found").with_status(404)));
        }
        if state.exists {
            return Ok(());
        }
        if state.stale_head_bucket_reads > 0 {
            state.stale_head_bucket_reads -= 1;
            return Ok(());
        }
        Err(anyhow!(ApiError::new("NotFound", "Not Found").with_status(404)))
    }

    async fn delete_bucket(&self) -> Result<()> {
        self.record(MockCall::DeleteBucket);
        let mut state = self.state.lock().unwrap();
        if !state.exists {
            return Err(api_error("NoSuchBucket"));
        }
        if state.stale_bucket_not_empty > 0 {
            state.stale_bucket_not_empty -= 1;
            return Err(api_error("BucketNotEmpty"));
        }
        if !state.entries.is_empty() {
            return Err(api_error("BucketNotEmpty"));
        }
        state.exists = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unversioned_delete_on_versioned_bucket_creates_marker() {
        let storage = MockStorage::new(VersioningStatus::Enabled);
        storage.put_object("k");

        storage.delete_object("k", None, false).await.unwrap();

        let page = storage.list_objects(None, None, 1000).await.unwrap();
        assert!(page.items.is_empty());
        let page = storage.list_object_versions(None, None, 1000).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items[1].is_delete_marker);
    }

    #[tokio::test]
    async fn version_listing_pages_through_entries() {
        let storage = MockStorage::new(VersioningStatus::Enabled);
        for i in 0..5 {
            storage.put_object(&format!("k{i}"));
        }

        let first = storage.list_object_versions(None, None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let second = storage
            .list_object_versions(None, first.next, 2)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        let third = storage
            .list_object_versions(None, second.next, 2)
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn legal_hold_blocks_delete() {
        let storage = MockStorage::new(VersioningStatus::Enabled);
        let version_id = storage.put_object("k").unwrap();
        storage.set_legal_hold("k", Some(&version_id), true);

        let result = storage
            .delete_object("k", Some(version_id.clone()), true)
            .await;
        assert!(result.is_err());
        assert_eq!(storage.legal_hold_of("k", Some(&version_id)), Some(true));
    }

    #[tokio::test]
    async fn delete_bucket_requires_empty_bucket() {
        let storage = MockStorage::new(VersioningStatus::Disabled);
        storage.put_object("k");

        assert!(storage.delete_bucket().await.is_err());
        storage.delete_object("k", None, false).await.unwrap();
        storage.delete_bucket().await.unwrap();
        assert!(storage.head_bucket().await.is_err());
    }
}
