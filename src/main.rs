mod config;
mod control;
mod events;
mod http;
mod metrics;
mod models;
mod optimizer;
mod platforms;
mod runner;
mod session;
mod store;
#[cfg(test)]
mod testing;

use config::RunnerConfig;
use eyre::WrapErr;
use events::RunnerEvent;
use runner::{RunnerContext, TaskRunner};
use session::ChromiumLauncher;
use std::sync::Arc;
use store::SupabaseTaskStore;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "reseller.app", "companion crashed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(RunnerConfig::from_env().wrap_err("loading configuration")?);
    let prometheus = crate::metrics::install_recorder().wrap_err("installing metrics recorder")?;
    let ctx = RunnerContext {
        store: Arc::new(SupabaseTaskStore::new(&config)),
        launcher: Arc::new(ChromiumLauncher::new(config.browser.clone())),
        config: config.clone(),
    };
    let runner = Arc::new(TaskRunner::new(ctx));

    tokio::spawn(drain_events(runner.subscribe()));
    runner.start().await.wrap_err("starting task runner")?;

    let app = control::router(runner.clone(), prometheus);
    let listener = tokio::net::TcpListener::bind(config.control_addr)
        .await
        .wrap_err_with(|| format!("binding control API to {}", config.control_addr))?;
    info!(target = "reseller.app", "control API listening on {}", config.control_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("serving control API")?;

    runner.stop().await.wrap_err("stopping task runner")?;
    info!(target = "reseller.app", "shut down cleanly");
    Ok(())
}

/// Mirrors runner events into the log stream so lifecycle changes are
/// visible without the dashboard attached.
async fn drain_events(mut events: tokio::sync::broadcast::Receiver<RunnerEvent>) {
    loop {
        match events.recv().await {
            Ok(RunnerEvent::TaskStarted { task }) => {
                debug!(target = "reseller.app", task_id = %task.id, "task_started");
            }
            Ok(RunnerEvent::TaskCompleted { task }) => {
                info!(target = "reseller.app", task_id = %task.id, platform = %task.platform, "task_completed");
            }
            Ok(RunnerEvent::TaskFailed { task, error }) => {
                warn!(target = "reseller.app", task_id = %task.id, platform = %task.platform, %error, "task_failed");
            }
            Ok(RunnerEvent::Log { .. }) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(target = "reseller.app", skipped, "event listener lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "reseller.app", error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!(target = "reseller.app", "shutdown requested");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,chromiumoxide=warn"));
    let _ = fmt().with_env_filter(filter).try_init();
}
