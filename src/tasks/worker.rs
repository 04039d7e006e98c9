use std::time::Instant;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::core::state::AppState;
use crate::schemas::grading::BulkReport;
use crate::services::grading_bulk;
use crate::tasks::jobs::{GradingJob, RedisJobQueue};

const JOB_WORKER_CONCURRENCY: usize = 2;

pub async fn run(state: AppState, queue: RedisJobQueue, poll_interval: Duration) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(JOB_WORKER_CONCURRENCY);
    for _ in 0..JOB_WORKER_CONCURRENCY {
        handles.push(tokio::spawn(job_worker(
            state.clone(),
            queue.clone(),
            poll_interval,
            shutdown_rx.clone(),
        )));
    }

    wait_for_shutdown().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to job workers");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Job worker join failed");
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => log_signal_error(result),
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                log_signal_error(tokio::signal::ctrl_c().await);
            }
        }
    }

    #[cfg(not(unix))]
    log_signal_error(tokio::signal::ctrl_c().await);

    tracing::info!("Shutdown signal received, draining job workers");
}

fn log_signal_error(result: std::io::Result<()>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C");
    }
}

async fn job_worker(
    state: AppState,
    queue: RedisJobQueue,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.next().await {
            Ok(Some(job)) => {
                process_job(&state, job).await;
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to read grading job queue"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll_interval) => {}
        }
    }
}

/// Runs a dequeued job through the same path as an inline bulk request.
///
/// Jobs may be delivered more than once; released submissions come back as
/// skipped rather than being released again.
pub async fn process_job(state: &AppState, job: GradingJob) -> BulkReport {
    let started = Instant::now();
    let name = job.name();

    let report = match job {
        GradingJob::BulkReleaseGrades { submission_ids, performer_id } => {
            grading_bulk::execute_bulk_release(state, &submission_ids, &performer_id).await
        }
        GradingJob::BulkApplyFeedback { submission_ids, feedback, performer_id } => {
            grading_bulk::execute_bulk_feedback(state, &submission_ids, &feedback, &performer_id)
                .await
        }
    };

    let status = if report.failed.is_empty() { "success" } else { "partial" };
    metrics::counter!("grading_jobs_total", "status" => status).increment(1);
    metrics::histogram!("grading_job_duration_seconds").record(started.elapsed().as_secs_f64());
    tracing::info!(
        job = name,
        succeeded = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Grading job processed"
    );

    report
}
