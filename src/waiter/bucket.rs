//! Prebuilt waiters for bucket-level configuration changes.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::storage::Storage;
use crate::types::{LifecycleRuleSummary, VersioningStatus};

use super::{ConvergenceWaiter, WaitCondition, WaitResult};

/// Lifecycle reads can return a stale cached configuration right after a
/// write, so a lifecycle wait needs this many matching reads in a row.
pub const LIFECYCLE_MIN_CONSECUTIVE_MATCHES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketPresence {
    Present,
    Absent,
}

impl ConvergenceWaiter {
    /// Wait until the bucket reports `expected` versioning.
    pub async fn wait_for_versioning_status(
        &self,
        storage: &Storage,
        expected: VersioningStatus,
        timeout: Duration,
    ) -> WaitResult<VersioningStatus> {
        let pending = [
            VersioningStatus::Enabled,
            VersioningStatus::Suspended,
            VersioningStatus::Disabled,
        ]
        .into_iter()
        .filter(|status| *status != expected)
        .map(Some);
        let condition = WaitCondition::new(
            |status: Option<&VersioningStatus>| status.copied(),
            pending,
            [Some(expected)],
            timeout,
        );

        self.wait_until(
            || async move { storage.get_bucket_versioning_status().await.map(Some) },
            &condition,
        )
        .await
    }

    /// Wait until the lifecycle rules equal `expected`, compared as a set of
    /// rule ids and states. An empty `expected` is satisfied by a bucket
    /// without lifecycle configuration.
    pub async fn wait_for_lifecycle_rules(
        &self,
        storage: &Storage,
        expected: Vec<LifecycleRuleSummary>,
        timeout: Duration,
    ) -> WaitResult<Vec<LifecycleRuleSummary>> {
        let expected: BTreeSet<LifecycleRuleSummary> = expected.into_iter().collect();
        let condition = WaitCondition::new(
            move |rules: Option<&Vec<LifecycleRuleSummary>>| match rules {
                Some(rules) => rules.iter().cloned().collect::<BTreeSet<_>>() == expected,
                None => expected.is_empty(),
            },
            [false],
            [true],
            timeout,
        )
        .with_min_consecutive_matches(LIFECYCLE_MIN_CONSECUTIVE_MATCHES);

        self.wait_until(
            || async move { storage.get_bucket_lifecycle_rules().await.map(Some) },
            &condition,
        )
        .await
    }

    /// Wait until a just-created bucket is visible. Not-found reads are
    /// tolerated up to the default grace budget.
    pub async fn wait_for_bucket_exists(
        &self,
        storage: &Storage,
        timeout: Duration,
    ) -> WaitResult<()> {
        let condition = WaitCondition::new(presence, [], [BucketPresence::Present], timeout);

        self.wait_until(|| async move { storage.head_bucket().await.map(Some) }, &condition)
            .await
    }

    /// Wait until HeadBucket reports the bucket gone.
    pub async fn wait_for_bucket_deleted(
        &self,
        storage: &Storage,
        timeout: Duration,
    ) -> WaitResult<()> {
        let condition = WaitCondition::new(
            presence,
            [BucketPresence::Present],
            [BucketPresence::Absent],
            timeout,
        );

        self.wait_until(|| async move { storage.head_bucket().await.map(Some) }, &condition)
            .await
    }
}

fn presence(state: Option<&()>) -> BucketPresence {
    match state {
        Some(()) => BucketPresence::Present,
        None => BucketPresence::Absent,
    }
}
