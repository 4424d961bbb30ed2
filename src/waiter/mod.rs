//! Bounded-time polling until a remote state converges.
//!
//! A [`WaitCondition`] maps each observed remote state to a status and
//! names which statuses are still pending and which satisfy the wait.
//! [`ConvergenceTracker`] is the pure state machine fed one observation at a
//! time; [`ConvergenceWaiter::wait_until`] drives it against a fetch closure
//! with exponential backoff, a deadline and cancellation.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::error::{S3emptyError, classify_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{ErrorKind, ProgressEvent, ProgressSink, report};

pub mod bucket;

pub use bucket::BucketPresence;

pub const DEFAULT_MIN_CONSECUTIVE_MATCHES: u32 = 1;
pub const DEFAULT_NOT_FOUND_GRACE_CHECKS: u32 = 20;
pub const DEFAULT_TRANSIENT_ERROR_TOLERANCE: u32 = 3;
pub const DEFAULT_INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

type StatusFn<S, T> = Box<dyn Fn(Option<&S>) -> T + Send + Sync>;

/// What a wait call is waiting for.
///
/// `status_of` receives `None` when the remote side reports "not found".
pub struct WaitCondition<S, T> {
    status_of: StatusFn<S, T>,
    pending: HashSet<T>,
    target: HashSet<T>,
    timeout: Duration,
    delay: Duration,
    initial_poll_interval: Duration,
    max_poll_interval: Duration,
    min_consecutive_matches: u32,
    not_found_grace_checks: u32,
    transient_error_tolerance: u32,
}

impl<S, T> WaitCondition<S, T>
where
    T: Clone + Eq + Hash + Debug,
{
    pub fn new(
        status_of: impl Fn(Option<&S>) -> T + Send + Sync + 'static,
        pending: impl IntoIterator<Item = T>,
        target: impl IntoIterator<Item = T>,
        timeout: Duration,
    ) -> Self {
        Self {
            status_of: Box::new(status_of),
            pending: pending.into_iter().collect(),
            target: target.into_iter().collect(),
            timeout,
            delay: Duration::ZERO,
            initial_poll_interval: DEFAULT_INITIAL_POLL_INTERVAL,
            max_poll_interval: DEFAULT_MAX_POLL_INTERVAL,
            min_consecutive_matches: DEFAULT_MIN_CONSECUTIVE_MATCHES,
            not_found_grace_checks: DEFAULT_NOT_FOUND_GRACE_CHECKS,
            transient_error_tolerance: DEFAULT_TRANSIENT_ERROR_TOLERANCE,
        }
    }

    /// Wait before the first fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_poll_interval = initial;
        self.max_poll_interval = max.max(initial);
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_min_consecutive_matches(mut self, matches: u32) -> Self {
        self.min_consecutive_matches = matches.max(1);
        self
    }

    pub fn with_not_found_grace_checks(mut self, checks: u32) -> Self {
        self.not_found_grace_checks = checks;
        self
    }

    pub fn with_transient_error_tolerance(mut self, tolerance: u32) -> Self {
        self.transient_error_tolerance = tolerance;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status_of(&self, state: Option<&S>) -> T {
        (self.status_of)(state)
    }

    pub fn tracker(&self) -> ConvergenceTracker<T> {
        ConvergenceTracker {
            pending: self.pending.clone(),
            target: self.target.clone(),
            min_consecutive_matches: self.min_consecutive_matches,
            not_found_grace_checks: self.not_found_grace_checks,
            transient_error_tolerance: self.transient_error_tolerance,
            state: ConvergenceState::Pending,
            streak: 0,
            not_found_checks: 0,
            transient_errors: 0,
            attempts: 0,
            last_status: None,
            error: None,
        }
    }
}

impl<S: 'static> WaitCondition<S, bool> {
    /// A boolean condition: satisfied when `predicate` holds, pending
    /// otherwise. A "not found" observation never satisfies it.
    pub fn from_predicate(
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
        timeout: Duration,
    ) -> Self {
        Self::new(
            move |state: Option<&S>| state.is_some_and(&predicate),
            [false],
            [true],
            timeout,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    /// The remote state has not (or no longer) been observed to match.
    Pending,
    /// The latest observation matched, but the streak is not long enough yet.
    Matched,
    /// Terminal: converged, or failed with [`ConvergenceTracker::error`].
    Settled,
}

/// One poll result, already mapped to a status.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Found(T),
    /// The remote side reported "not found"; carries the status of absence.
    NotFound(T),
    TransientError(String),
    Failed(S3emptyError),
}

/// Pure Pending / Matched / Settled state machine.
///
/// A target status extends the match streak, a pending status resets it,
/// and any other status settles with [`S3emptyError::UnexpectedState`].
/// Not-found observations whose status is not a target count against the
/// grace budget. Transient errors count against their own budget and leave
/// the streak unchanged. Both budgets reset on the next successful read.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker<T> {
    pending: HashSet<T>,
    target: HashSet<T>,
    min_consecutive_matches: u32,
    not_found_grace_checks: u32,
    transient_error_tolerance: u32,
    state: ConvergenceState,
    streak: u32,
    not_found_checks: u32,
    transient_errors: u32,
    attempts: u32,
    last_status: Option<T>,
    error: Option<S3emptyError>,
}

impl<T> ConvergenceTracker<T>
where
    T: Clone + Eq + Hash + Debug,
{
    pub fn observe(&mut self, observation: Observation<T>) -> ConvergenceState {
        if self.state == ConvergenceState::Settled {
            return self.state;
        }
        self.attempts += 1;

        match observation {
            Observation::Found(status) => {
                self.not_found_checks = 0;
                self.transient_errors = 0;
                self.classify_status(status);
            }
            Observation::NotFound(status) => {
                self.transient_errors = 0;
                if self.target.contains(&status) {
                    self.not_found_checks = 0;
                    self.extend_streak(status);
                } else {
                    self.last_status = Some(status);
                    self.streak = 0;
                    self.not_found_checks += 1;
                    if self.not_found_checks > self.not_found_grace_checks {
                        self.settle_with(S3emptyError::NotFoundAfterGrace {
                            checks: self.not_found_checks,
                        });
                    } else {
                        self.state = ConvergenceState::Pending;
                    }
                }
            }
            Observation::TransientError(message) => {
                self.transient_errors += 1;
                if self.transient_errors > self.transient_error_tolerance {
                    self.settle_with(S3emptyError::AwsSdk(message));
                }
            }
            Observation::Failed(error) => self.settle_with(error),
        }

        self.state
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn last_status(&self) -> Option<&T> {
        self.last_status.as_ref()
    }

    /// The failure a settled tracker ended with; `None` when it converged.
    pub fn error(&self) -> Option<&S3emptyError> {
        self.error.as_ref()
    }

    /// Error to report when the deadline elapses before settling.
    pub fn timeout_error(&self) -> S3emptyError {
        S3emptyError::WaitTimeout {
            attempts: self.attempts,
            last_status: self.describe_last_status(),
        }
    }

    fn describe_last_status(&self) -> String {
        self.last_status
            .as_ref()
            .map_or_else(|| "none".to_string(), |status| format!("{status:?}"))
    }

    fn classify_status(&mut self, status: T) {
        if self.target.contains(&status) {
            self.extend_streak(status);
        } else if self.pending.contains(&status) {
            self.last_status = Some(status);
            self.streak = 0;
            self.state = ConvergenceState::Pending;
        } else {
            let error = S3emptyError::UnexpectedState {
                status: format!("{status:?}"),
                target: format!("{:?}", self.target),
            };
            self.last_status = Some(status);
            self.settle_with(error);
        }
    }

    fn extend_streak(&mut self, status: T) {
        self.last_status = Some(status);
        self.streak += 1;
        self.state = if self.streak >= self.min_consecutive_matches {
            ConvergenceState::Settled
        } else {
            ConvergenceState::Matched
        };
    }

    fn settle_with(&mut self, error: S3emptyError) {
        self.streak = 0;
        self.error = Some(error);
        self.state = ConvergenceState::Settled;
    }
}

/// Result of a wait call.
///
/// `final_state` is the last remote state read (`None` if the last read was
/// "not found" or failed). `attempts` counts fetch calls.
#[derive(Debug)]
pub struct WaitResult<S> {
    pub final_state: Option<S>,
    pub attempts: u32,
    pub error: Option<anyhow::Error>,
}

impl<S> WaitResult<S> {
    pub fn is_converged(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives [`ConvergenceTracker`]s against remote fetches.
#[derive(Clone)]
pub struct ConvergenceWaiter {
    cancellation_token: PipelineCancellationToken,
    progress: Option<ProgressSink>,
}

impl ConvergenceWaiter {
    pub fn new(cancellation_token: PipelineCancellationToken) -> Self {
        Self {
            cancellation_token,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Poll `fetch` until `condition` settles, the timeout elapses or the
    /// token is cancelled.
    ///
    /// `fetch` returns `Ok(None)` (or a not-found error) when the remote
    /// resource does not exist. A fetch is never abandoned mid-call;
    /// cancellation is observed before each fetch and during sleeps.
    pub async fn wait_until<S, T, F, Fut>(
        &self,
        mut fetch: F,
        condition: &WaitCondition<S, T>,
    ) -> WaitResult<S>
    where
        T: Clone + Eq + Hash + Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<S>>>,
    {
        let deadline = Instant::now() + condition.timeout;
        let mut tracker = condition.tracker();
        let mut final_state: Option<S> = None;
        let mut interval = condition.initial_poll_interval;

        if !condition.delay.is_zero() && !self.sleep_until_or_cancelled(deadline, condition.delay).await
        {
            return cancelled(final_state, &tracker);
        }

        loop {
            if self.cancellation_token.is_cancelled() {
                return cancelled(final_state, &tracker);
            }

            let observation = match fetch().await {
                Ok(Some(state)) => {
                    let status = condition.status_of(Some(&state));
                    final_state = Some(state);
                    Observation::Found(status)
                }
                Ok(None) => {
                    final_state = None;
                    Observation::NotFound(condition.status_of(None))
                }
                Err(e) => match classify_error(&e) {
                    ErrorKind::NotFound => {
                        final_state = None;
                        Observation::NotFound(condition.status_of(None))
                    }
                    ErrorKind::Transient => {
                        warn!(
                            error = format!("{e:#}"),
                            "transient error while polling, will retry."
                        );
                        Observation::TransientError(format!("{e:#}"))
                    }
                    ErrorKind::Cancelled => Observation::Failed(S3emptyError::Cancelled),
                    _ => Observation::Failed(S3emptyError::AwsSdk(format!("{e:#}"))),
                },
            };

            let state = tracker.observe(observation);
            let status = tracker.describe_last_status();
            debug!(
                attempt = tracker.attempts(),
                status = status,
                streak = tracker.streak(),
                state = ?state,
                "poll attempt completed."
            );
            report(
                &self.progress,
                ProgressEvent::PollAttempt {
                    attempt: tracker.attempts(),
                    status,
                },
            )
            .await;

            if state == ConvergenceState::Settled {
                return WaitResult {
                    final_state,
                    attempts: tracker.attempts(),
                    error: tracker.error().cloned().map(|e| anyhow!(e)),
                };
            }

            if Instant::now() >= deadline {
                let error = tracker.timeout_error();
                warn!(attempts = tracker.attempts(), "{}", error);
                return WaitResult {
                    final_state,
                    attempts: tracker.attempts(),
                    error: Some(anyhow!(error)),
                };
            }

            if !self.sleep_until_or_cancelled(deadline, interval).await {
                return cancelled(final_state, &tracker);
            }
            interval = (interval * 2).min(condition.max_poll_interval);
        }
    }

    /// Sleep for `duration`, capped at `deadline`. Returns false if the
    /// token was cancelled first.
    async fn sleep_until_or_cancelled(&self, deadline: Instant, duration: Duration) -> bool {
        let wake_at = (Instant::now() + duration).min(deadline);
        tokio::select! {
            _ = tokio::time::sleep_until(wake_at) => true,
            _ = self.cancellation_token.cancelled() => false,
        }
    }
}

fn cancelled<S, T>(final_state: Option<S>, tracker: &ConvergenceTracker<T>) -> WaitResult<S> {
    WaitResult {
        final_state,
        attempts: tracker.attempts,
        error: Some(anyhow!(S3emptyError::Cancelled)),
    }
}
