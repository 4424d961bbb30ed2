/*!
# Overview
s3empty-rs empties Amazon S3 buckets: every object, every object version and
every delete marker under a bucket or prefix, with optional legal-hold bypass.
It also provides bounded-time convergence waiters for bucket configuration
changes that S3 applies with eventual consistency.

## Features
- **Complete**: versioned buckets are erased including history and delete markers
- **Batched**: multi-object delete API, up to 1000 versions per request
- **Protection aware**: legal holds are cleared only when forced, never on a plain access denial
- **Bounded**: every erase and wait runs against a deadline and a cancellation token
- **Idempotent**: already deleted objects are not errors, so a failed run can simply be repeated

## As a Library
The `s3empty` CLI is a thin wrapper over this library.

Example usage
=============

```toml
[dependencies]
s3empty-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3empty_rs::{BulkEraser, Config, create_pipeline_cancellation_token, create_storage};

#[tokio::main]
async fn main() {
    let mut config = Config::for_target("my-bucket", "logs/");
    config.batch_size = 500;

    let storage = create_storage(&config).await;
    let cancellation_token = create_pipeline_cancellation_token();

    let result = BulkEraser::new(storage, config, cancellation_token)
        .erase()
        .await;

    println!("deleted {} object versions", result.deleted_count);
    if let Some(e) = result.error {
        eprintln!("{e}");
    }
}
```
*/

pub mod config;
pub mod deleter;
pub mod destroy;
pub mod eraser;
pub mod lister;
pub mod storage;
pub mod types;
pub mod waiter;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use config::args::{CLIArgs, parse_from_args};
pub use deleter::DeletionExecutor;
pub use destroy::BucketDestroyer;
pub use eraser::{BulkEraser, EraseResult};
pub use lister::VersionEnumerator;
pub use storage::{Storage, StorageTrait, create_storage};
pub use types::error::S3emptyError;
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{DeletionOutcome, ErrorKind, ObjectVersionRef, ProgressEvent};
pub use waiter::{ConvergenceWaiter, WaitCondition, WaitResult};
