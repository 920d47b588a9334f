use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once; later calls and disabled settings are no-ops.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    if PROM_HANDLE.set(handle).is_ok() {
        describe_lifecycle_metrics();
    }
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_lifecycle_metrics() {
    metrics::describe_counter!("exam_transitions_total", "Exam status changes by target status");
    metrics::describe_counter!("attempts_started_total", "Attempts admitted");
    metrics::describe_counter!(
        "attempts_auto_submitted_total",
        "Attempts submitted by the system, by reason"
    );
    metrics::describe_counter!("integrity_violations_total", "Proctoring events by type");
    metrics::describe_counter!("evaluations_total", "Grader outcomes per attempt");
    metrics::describe_counter!("http_requests_total", "HTTP responses by status");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency"
    );
}
