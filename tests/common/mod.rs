//! In-memory versioned bucket implementing `StorageTrait` for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use s3empty_rs::StorageTrait;
use s3empty_rs::types::error::ApiError;
use s3empty_rs::types::{
    BatchDeleteError, BatchDeleteResponse, LegalHoldStatus, LifecycleRuleSummary, ListCursor,
    ListPage, ObjectVersionRef, VersioningStatus,
};

#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub version_id: Option<String>,
    pub is_delete_marker: bool,
    pub legal_hold: bool,
}

impl Entry {
    fn to_ref(&self) -> ObjectVersionRef {
        ObjectVersionRef {
            key: self.key.clone(),
            version_id: self.version_id.clone(),
            is_delete_marker: self.is_delete_marker,
        }
    }

    fn sort_key(&self) -> (String, String) {
        (
            self.key.clone(),
            self.version_id.clone().unwrap_or_default(),
        )
    }
}

#[derive(Debug)]
pub struct BucketState {
    pub exists: bool,
    pub versioning: VersioningStatus,
    pub entries: Vec<Entry>,
    pub lifecycle_rules: Vec<LifecycleRuleSummary>,
    pub delete_objects_requests: usize,
    next_version: u64,
}

#[derive(Debug, Clone)]
pub struct InMemoryBucket {
    name: String,
    pub state: Arc<Mutex<BucketState>>,
}

fn service_error(code: &str, status: u16) -> anyhow::Error {
    anyhow!(ApiError::new(code, "in-memory bucket").with_status(status))
}

impl InMemoryBucket {
    pub fn new(name: &str, versioning: VersioningStatus) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(BucketState {
                exists: true,
                versioning,
                entries: Vec::new(),
                lifecycle_rules: Vec::new(),
                delete_objects_requests: 0,
                next_version: 0,
            })),
        }
    }

    pub fn boxed(&self) -> s3empty_rs::Storage {
        Box::new(self.clone())
    }

    /// Upload an object and return its version id, if the bucket has one.
    pub fn put_object(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        if state.versioning == VersioningStatus::Disabled {
            state.entries.retain(|entry| entry.key != key);
            state.entries.push(Entry {
                key: key.to_string(),
                version_id: None,
                is_delete_marker: false,
                legal_hold: false,
            });
            return None;
        }

        state.next_version += 1;
        let version_id = format!("v{:06}", state.next_version);
        state.entries.push(Entry {
            key: key.to_string(),
            version_id: Some(version_id.clone()),
            is_delete_marker: false,
            legal_hold: false,
        });
        Some(version_id)
    }

    pub fn put_delete_marker(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        let version_id = format!("v{:06}", state.next_version);
        state.entries.push(Entry {
            key: key.to_string(),
            version_id: Some(version_id),
            is_delete_marker: true,
            legal_hold: false,
        });
    }

    pub fn set_legal_hold(&self, key: &str, version_id: &str) {
        let mut state = self.state.lock().unwrap();
        for entry in state.entries.iter_mut() {
            if entry.key == key && entry.version_id.as_deref() == Some(version_id) {
                entry.legal_hold = true;
            }
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<String> = state.entries.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn held_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|entry| entry.legal_hold)
            .count()
    }

    fn check_exists(state: &BucketState) -> Result<()> {
        if state.exists {
            Ok(())
        } else {
            Err(service_error("NoSuchBucket", 404))
        }
    }

    /// Remove one entry; `Err` carries the error code for a held version.
    fn remove(state: &mut BucketState, key: &str, version_id: Option<&str>) -> Result<(), String> {
        if version_id.is_none() && state.versioning != VersioningStatus::Disabled {
            state.next_version += 1;
            let marker = format!("v{:06}", state.next_version);
            state.entries.push(Entry {
                key: key.to_string(),
                version_id: Some(marker),
                is_delete_marker: true,
                legal_hold: false,
            });
            return Ok(());
        }

        let position = state
            .entries
            .iter()
            .position(|entry| entry.key == key && entry.version_id.as_deref() == version_id);
        match position {
            Some(index) if state.entries[index].legal_hold => Err("AccessDenied".to_string()),
            Some(index) => {
                state.entries.remove(index);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn sorted_entries(state: &BucketState, prefix: Option<&str>) -> Vec<Entry> {
        let mut entries: Vec<Entry> = state
            .entries
            .iter()
            .filter(|entry| prefix.is_none_or(|prefix| entry.key.starts_with(prefix)))
            .cloned()
            .collect();
        entries.sort_by_key(Entry::sort_key);
        entries
    }
}

#[async_trait]
impl StorageTrait for InMemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    fn is_express_onezone_storage(&self) -> bool {
        self.name.ends_with("--x-s3")
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
        let state = self.state.lock().unwrap();
        Self::check_exists(&state)?;

        let start_after = match cursor {
            Some(ListCursor::ContinuationToken(token)) => Some(token),
            _ => None,
        };
        let mut keys: Vec<String> = Self::sorted_entries(&state, prefix)
            .into_iter()
            .filter(|entry| !entry.is_delete_marker)
            .map(|entry| entry.key)
            .filter(|key| start_after.as_ref().is_none_or(|after| key > after))
            .collect();
        keys.dedup();

        let limit = max_keys.max(1) as usize;
        let next = if keys.len() > limit {
            keys.truncate(limit);
            keys.last().cloned().map(ListCursor::ContinuationToken)
        } else {
            None
        };

        Ok(ListPage {
            items: keys.iter().map(|key| ObjectVersionRef::current(key)).collect(),
            next,
        })
    }

    async fn list_object_versions(
        &self,
        prefix: Option<&str>,
        cursor: Option<ListCursor>,
        max_keys: i32,
    ) -> Result<ListPage> {
        let state = self.state.lock().unwrap();
        Self::check_exists(&state)?;

        let marker = match cursor {
            Some(ListCursor::VersionMarker {
                key_marker: Some(key),
                version_id_marker,
            }) => Some((key, version_id_marker.unwrap_or_default())),
            _ => None,
        };
        let mut entries: Vec<Entry> = Self::sorted_entries(&state, prefix)
            .into_iter()
            .filter(|entry| marker.as_ref().is_none_or(|marker| entry.sort_key() > *marker))
            .collect();

        let limit = max_keys.max(1) as usize;
        let next = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|last| ListCursor::VersionMarker {
                key_marker: Some(last.key.clone()),
                version_id_marker: last.version_id.clone(),
            })
        } else {
            None
        };

        let (markers, versions): (Vec<Entry>, Vec<Entry>) =
            entries.into_iter().partition(|entry| entry.is_delete_marker);
        Ok(ListPage {
            items: versions.iter().chain(markers.iter()).map(Entry::to_ref).collect(),
            next,
        })
    }

    async fn delete_object(
        &self,
        key: &str,
        version_id: Option<String>,
        _bypass_governance_retention: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_exists(&state)?;

        Self::remove(&mut state, key, version_id.as_deref())
            .map_err(|code| service_error(&code, 403))
    }

    async fn delete_objects(
        &self,
        objects: Vec<ObjectVersionRef>,
        _quiet: bool,
        _bypass_governance_retention: bool,
    ) -> Result<BatchDeleteResponse> {
        let mut state = self.state.lock().unwrap();
        Self::check_exists(&state)?;
        state.delete_objects_requests += 1;

        let mut response = BatchDeleteResponse::default();
        for object in objects {
            if let Err(code) = Self::remove(&mut state, &object.key, object.version_id()) {
                response.errors.push(BatchDeleteError {
                    object,
                    code,
                    message: "Access Denied".to_string(),
                });
            }
        }
        Ok(response)
    }

    async fn get_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
    ) -> Result<LegalHoldStatus> {
        let state = self.state.lock().unwrap();
        Self::check_exists(&state)?;

        state
            .entries
            .iter()
            .find(|entry| entry.key == key && entry.version_id == version_id)
            .map(|entry| {
                if entry.legal_hold {
                    LegalHoldStatus::On
                } else {
                    LegalHoldStatus::Off
                }
            })
            .ok_or_else(|| service_error("NoSuchKey", 404))
    }

    async fn put_object_legal_hold(
        &self,
        key: &str,
        version_id: Option<String>,
        status: LegalHoldStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_exists(&state)?;

        let entry = state
            .entries
            .iter_mut()
            .find(|entry| entry.key == key && entry.version_id == version_id)
            .ok_or_else(|| service_error("NoSuchKey", 404))?;
        entry.legal_hold = status == LegalHoldStatus::On;
        Ok(())
    }

    async fn get_bucket_versioning_status(&self) -> Result<VersioningStatus> {
        let state = self.state.lock().unwrap();
        Self::check_exists(&state)?;
        Ok(state.versioning)
    }

    async fn get_bucket_lifecycle_rules(&self) -> Result<Vec<LifecycleRuleSummary>> {
        let state = self.state.lock().unwrap();
        Self::check_exists(&state)?;
        if state.lifecycle_rules.is_empty() {
            return Err(service_error("NoSuchLifecycleConfiguration", 404));
        }
        Ok(state.lifecycle_rules.clone())
    }

    async fn head_bucket(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.exists {
            Ok(())
        } else {
            Err(service_error("NotFound", 404))
        }
    }

    async fn delete_bucket(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_exists(&state)?;
        if !state.entries.is_empty() {
            return Err(service_error("BucketNotEmpty", 409));
        }
        state.exists = false;
        Ok(())
    }
}
