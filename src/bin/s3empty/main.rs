use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, info, trace};

use s3empty_rs::config::Config;
use s3empty_rs::types::ProgressSink;
use s3empty_rs::types::error::{exit_code_from_error, is_cancelled_error};
use s3empty_rs::{
    BucketDestroyer, BulkEraser, CLIArgs, PipelineCancellationToken,
    create_pipeline_cancellation_token, create_storage,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

/// s3empty - Empty an Amazon S3 bucket completely.
///
/// This binary is a thin wrapper over the s3empty-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3empty",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    if let Err(e) = run(config).await {
        if is_cancelled_error(&e) {
            debug!("erase cancelled by user.");
            return Ok(());
        }
        error!("{e}");
        std::process::exit(exit_code_from_error(&e));
    }

    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let (sender, receiver) = async_channel::unbounded();
    let indicator_join_handle = indicator::show_indicator(
        receiver,
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
    );

    let start_time = tokio::time::Instant::now();
    debug!(bucket = config.bucket(), "s3empty start.");

    // the sender is moved in so the indicator ends with the run
    let result = execute(config, cancellation_token, sender).await;
    indicator_join_handle.await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    match &result {
        Ok(()) => info!(duration_sec = duration_sec, "s3empty has been completed."),
        Err(_) => debug!(duration_sec = duration_sec, "s3empty failed."),
    }

    result
}

async fn execute(
    config: Config,
    cancellation_token: PipelineCancellationToken,
    progress: ProgressSink,
) -> Result<()> {
    let storage = create_storage(&config).await;

    if config.delete_bucket {
        let object_lock_enabled = config.object_lock_enabled || config.force;
        let timeout = config.timeout;
        let erased = BucketDestroyer::new(storage, config, cancellation_token)
            .with_progress(Some(progress))
            .destroy(true, object_lock_enabled, timeout)
            .await?;
        debug!(erased = erased, "bucket destroyed.");
        return Ok(());
    }

    let result = BulkEraser::new(storage, config, cancellation_token)
        .with_progress(Some(progress))
        .erase()
        .await;

    match result.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
