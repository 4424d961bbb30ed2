pub mod args;

use std::time::Duration;

use crate::types::{ClientConfigLocation, S3Credentials, StoragePath};

/// Main configuration for an erase (or destroy) run.
///
/// Holds the target bucket/prefix, AWS client settings, batch sizing,
/// the run deadline and the protection-bypass flags.
///
/// # Quick Start
///
/// ```
/// use s3empty_rs::Config;
///
/// let config = Config::for_target("my-bucket", "logs/2024/");
/// assert_eq!(config.batch_size, 1000);
/// assert_eq!(config.timeout.as_secs(), 1800);
/// assert!(!config.force);
/// ```
///
/// Then customize fields as needed:
///
/// ```
/// use std::time::Duration;
/// use s3empty_rs::Config;
///
/// let mut config = Config::for_target("my-bucket", "");
/// config.batch_size = 250;
/// config.timeout = Duration::from_secs(600);
/// config.force = true;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub target: StoragePath,
    pub show_no_progress: bool,
    pub target_client_config: Option<ClientConfig>,
    pub force_retry_config: ForceRetryConfig,
    pub tracing_config: Option<TracingConfig>,
    pub max_keys: i32,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
    // Erase options
    pub batch_size: u16,
    pub timeout: Duration,
    /// Clear legal holds and bypass governance retention.
    pub force: bool,
    /// Delete the bucket itself once it has been emptied.
    pub delete_bucket: bool,
    /// The bucket was created with Object Lock; the destroy path erases with `force`.
    pub object_lock_enabled: bool,
}

impl Config {
    /// Create a `Config` with defaults for the given S3 bucket and prefix.
    ///
    /// An empty prefix targets the whole bucket.
    pub fn for_target(bucket: &str, prefix: &str) -> Self {
        Config {
            target: StoragePath::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            },
            ..Config::default()
        }
    }

    pub fn bucket(&self) -> &str {
        let StoragePath::S3 { bucket, .. } = &self.target;
        bucket
    }

    /// The key prefix, or `None` when the whole bucket is targeted.
    pub fn prefix(&self) -> Option<&str> {
        let StoragePath::S3 { prefix, .. } = &self.target;
        if prefix.is_empty() {
            None
        } else {
            Some(prefix)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            show_no_progress: false,
            target_client_config: None,
            force_retry_config: ForceRetryConfig::default(),
            tracing_config: None,
            max_keys: 1000,
            auto_complete_shell: None,
            batch_size: 1000,
            timeout: Duration::from_secs(1800),
            force: false,
            delete_bucket: false,
            object_lock_enabled: false,
        }
    }
}

impl Default for ForceRetryConfig {
    fn default() -> Self {
        ForceRetryConfig {
            force_retry_count: 0,
            force_retry_interval_milliseconds: 1000,
        }
    }
}

/// AWS S3 client configuration.
///
/// The client itself is built by [`ClientConfig::create_client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub accelerate: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
}

/// Retry configuration handed to the AWS SDK retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Application-level retries of single-object deletes after a transient
/// batch-delete error entry (in addition to AWS SDK retries).
#[derive(Debug, Clone, Copy)]
pub struct ForceRetryConfig {
    pub force_retry_count: u32,
    pub force_retry_interval_milliseconds: u64,
}
