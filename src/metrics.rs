use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

// Each counter is also emitted as a trace event on `reseller.metrics`.

/// Installs the process-wide Prometheus recorder behind `GET /metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn poll_cycle(found_task: bool) {
    ::metrics::counter!(
        "reseller_poll_cycles_total",
        "found_task" => if found_task { "true" } else { "false" }
    )
    .increment(1);
    trace!(
        target = "reseller.metrics",
        found_task = found_task,
        "poll_cycle"
    );
}

pub fn task_finished(platform: &str, action: &str, outcome: &'static str, elapsed_ms: u128) {
    ::metrics::counter!(
        "reseller_tasks_total",
        "platform" => platform.to_string(),
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!("reseller_task_duration_ms", "platform" => platform.to_string())
        .record(elapsed_ms as f64);
    trace!(
        target = "reseller.metrics",
        platform = platform,
        action = action,
        outcome = outcome,
        elapsed_ms = elapsed_ms as u64,
        "task_finished"
    );
}
