use std::net::SocketAddr;

use anyhow::Context;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::core::config::Settings;

/// Installs the Prometheus recorder and its scrape listener, then registers
/// help text for every grading metric.
pub fn init(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    if !telemetry.prometheus_enabled {
        return Ok(());
    }

    let addr: SocketAddr = telemetry
        .prometheus_listen
        .parse()
        .with_context(|| format!("invalid PROMETHEUS_LISTEN {}", telemetry.prometheus_listen))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    describe();
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn describe() {
    describe_counter!("manual_grades_total", "Submissions finalised by an instructor");
    describe_counter!("auto_graded_answers_total", "Answers scored without an instructor");
    describe_counter!("grades_released_total", "Grades made visible to students");
    describe_counter!("appeals_submitted_total", "Late-penalty appeals filed");
    describe_counter!("appeals_decided_total", "Appeals approved or denied, by status");
    describe_counter!("bulk_items_failed_total", "Bulk items that failed, by operation");
    describe_counter!("grading_jobs_total", "Background grading jobs, by status");
    describe_histogram!(
        "grading_job_duration_seconds",
        Unit::Seconds,
        "Time spent processing one grading job"
    );
}
