/// A cancellation token threaded through every engine component.
///
/// This is a type alias for [`tokio_util::sync::CancellationToken`]. Call
/// [`cancel()`](tokio_util::sync::CancellationToken::cancel) on it (e.g. from
/// a Ctrl+C handler) to stop a running erase or wait between network calls.
pub type PipelineCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`PipelineCancellationToken`].
///
/// # Example
///
/// ```
/// use s3empty_rs::create_pipeline_cancellation_token;
///
/// let token = create_pipeline_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    tokio_util::sync::CancellationToken::new()
}
