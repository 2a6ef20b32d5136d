//! `cardsync-worker` -- reconciles and delivers title cards for one batch.
//!
//! Loads the batch named by `CARDSYNC_BATCH_FILE`, brings every episode's
//! card up to date, copies changed cards to each destination directory and
//! prints a JSON summary on stdout. Logs go to stderr.
//!
//! See [`cardsync_worker::config::WorkerConfig::from_env`] for the
//! environment variables.

use std::sync::Arc;

use cardsync_core::Engine;
use cardsync_worker::batch::Batch;
use cardsync_worker::config::{LogFormat, WorkerConfig};
use cardsync_worker::destination::DirectoryDestination;
use cardsync_worker::error::WorkerError;
use cardsync_worker::fs::LocalFilesystem;
use cardsync_worker::renderer::CommandRenderer;
use cardsync_worker::runner::{run_episodes, RunOptions};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "cardsync_worker=info,cardsync_core=info".into()),
    );
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(config: WorkerConfig) -> Result<(), WorkerError> {
    let batch = Batch::load(&config.batch_file)?;
    let episode_ids = batch.episode_ids();
    let store = batch.into_store()?;

    tracing::info!(
        batch_file = %config.batch_file.display(),
        episodes = episode_ids.len(),
        render_command = %config.render_command,
        render_timeout_secs = config.render_timeout.as_secs(),
        max_concurrency = config.max_concurrency,
        dry_run = config.dry_run,
        "Starting cardsync-worker",
    );

    let engine = Arc::new(Engine::new(
        store,
        CommandRenderer::new(
            config.render_command.clone(),
            config.render_timeout,
            tokio::runtime::Handle::current(),
        ),
        LocalFilesystem,
    ));
    let options = RunOptions {
        max_concurrency: config.max_concurrency,
        force_redelivery: config.force_redelivery,
        dry_run: config.dry_run,
    };
    let summary = run_episodes(
        engine,
        Arc::new(DirectoryDestination),
        episode_ids,
        options,
    )
    .await?;

    tracing::info!(
        episodes = summary.episodes,
        actions = ?summary.actions,
        delivered = summary.delivered,
        delivery_failures = summary.delivery_failures,
        "Batch complete",
    );

    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| WorkerError::Task(format!("Cannot serialize summary: {e}")))?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Worker failed");
        std::process::exit(1);
    }
}
