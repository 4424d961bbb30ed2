use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::storage::Storage;
use crate::types::error::S3emptyError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ListCursor, ObjectVersionRef};

/// Lazily pages through the deletion candidates of a bucket.
///
/// With `versioned == false` only current objects are listed (no version
/// id). With `versioned == true` the version history is listed and every
/// object version and delete marker becomes a candidate.
///
/// The sequence is forward-only and finite. At most one page is held in
/// memory, and items are relayed in listing order without de-duplication.
/// A failed page fetch is yielded once as `Some(Err(_))`, after which the
/// sequence is exhausted, so an empty bucket (`None` on the first call) is
/// always distinguishable from a listing failure.
pub struct VersionEnumerator {
    storage: Storage,
    prefix: Option<String>,
    versioned: bool,
    max_keys: i32,
    cancellation_token: PipelineCancellationToken,
    page: VecDeque<ObjectVersionRef>,
    cursor: Option<ListCursor>,
    started: bool,
    exhausted: bool,
}

impl VersionEnumerator {
    pub fn new(
        storage: Storage,
        prefix: Option<&str>,
        versioned: bool,
        max_keys: i32,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            prefix: prefix.map(str::to_string),
            versioned,
            max_keys,
            cancellation_token,
            page: VecDeque::new(),
            cursor: None,
            started: false,
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.page.is_empty()
    }

    /// Next candidate, fetching a new page when the current one is drained.
    ///
    /// The cancellation token is checked before every page fetch, never
    /// while a request is in flight.
    pub async fn next(&mut self) -> Option<Result<ObjectVersionRef>> {
        loop {
            if let Some(object) = self.page.pop_front() {
                return Some(Ok(object));
            }
            if self.exhausted {
                return None;
            }
            if self.started && self.cursor.is_none() {
                self.exhausted = true;
                return None;
            }
            if self.cancellation_token.is_cancelled() {
                self.exhausted = true;
                return Some(Err(anyhow!(S3emptyError::Cancelled)));
            }

            if let Err(e) = self.fetch_page().await {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }

    /// Collect up to `max` candidates.
    ///
    /// Returns fewer than `max` only when the sequence is exhausted.
    pub async fn next_batch(&mut self, max: usize) -> Result<Vec<ObjectVersionRef>> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.next().await {
                Some(Ok(object)) => batch.push(object),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(batch)
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let prefix = self.prefix.as_deref();
        let cursor = self.cursor.take();

        let page = if self.versioned {
            self.storage
                .list_object_versions(prefix, cursor, self.max_keys)
                .await?
        } else {
            self.storage
                .list_objects(prefix, cursor, self.max_keys)
                .await?
        };

        debug!(
            bucket = self.storage.bucket(),
            prefix = prefix,
            versioned = self.versioned,
            items = page.items.len(),
            has_next = page.next.is_some(),
            "listing page fetched."
        );

        self.started = true;
        self.cursor = page.next;
        self.page = page.items.into();
        Ok(())
    }
}
