//! Runner binary.

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidtask_feedback::FeedbackReporter;
use vidtask_jobs::{register_video_jobs, JobRegistry, RegistryDefaults};
use vidtask_queue::JobQueue;
use vidtask_runner::{Runner, RunnerConfig, WorkerPool};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_lowercase()));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting vidtask-runner v{}", env!("CARGO_PKG_VERSION"));

    let config = RunnerConfig::from_env();
    info!("Runner config: {:?}", config);

    // Broker client; an unreachable broker is a fatal startup error.
    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create broker client: {}", e);
            std::process::exit(1);
        }
    };

    let reporter = match FeedbackReporter::from_env() {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to create feedback reporter: {}", e);
            std::process::exit(1);
        }
    };

    // Register job handlers
    let mut registry = JobRegistry::new(RegistryDefaults::from_env());
    register_video_jobs(&mut registry);
    info!("Registered jobs: {}", registry.names().join(", "));

    let (drain_tx, drain_rx) = watch::channel(false);
    let pool = WorkerPool::new(config.clone(), queue, registry, reporter, drain_rx);

    let mut runner = Runner::new(config);
    runner.register_shutdown_callback(|| {
        info!("Broker client shut down");
    });

    let exit_code = runner.start(drain_tx, pool).await;

    info!("Runner shutdown complete (exit code {})", exit_code);
    std::process::exit(exit_code);
}
