use std::collections::{HashMap, HashSet};

use validator::Validate;

use crate::core::state::AppState;
use crate::db::types::SubmissionState;
use crate::errors::{GradingError, GradingResult};
use crate::schemas::grading::{
    BulkFailure, BulkFeedbackRequest, BulkOutcome, BulkReleaseRequest, BulkReport, ReleaseOutcome,
};
use crate::services::grading_actions;
use crate::tasks::jobs::GradingJob;

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn check_batch_size(state: &AppState, ids: &[String]) -> GradingResult<()> {
    let max = state.grading().bulk_max_batch;
    if ids.len() > max {
        return Err(GradingError::Validation(format!(
            "a bulk operation accepts at most {max} submissions, got {}",
            ids.len()
        )));
    }
    Ok(())
}

fn reject(violations: Vec<String>) -> GradingResult<()> {
    if violations.is_empty() {
        return Ok(());
    }
    Err(GradingError::Validation(format!("invalid submission batch: {}", violations.join("; "))))
}

/// Every id must be releasable before anything is touched.
async fn validate_release_batch(state: &AppState, ids: &[String]) -> GradingResult<()> {
    let grades: HashMap<String, bool> = state
        .grades()
        .find_by_submissions(ids)
        .await?
        .into_iter()
        .map(|grade| (grade.submission_id, grade.is_draft))
        .collect();

    let mut violations = Vec::new();
    for id in ids {
        let Some(submission) = state.submissions().find(id).await? else {
            violations.push(format!("{id} does not exist"));
            continue;
        };
        if !matches!(submission.state, SubmissionState::Graded | SubmissionState::Released) {
            violations.push(format!("{id} is {}", submission.state.as_str()));
        }
        if grades.get(id).copied().unwrap_or(false) {
            violations.push(format!("{id} has a draft grade"));
        }
    }

    reject(violations)
}

async fn validate_existing(state: &AppState, ids: &[String]) -> GradingResult<()> {
    let mut violations = Vec::new();
    for id in ids {
        if state.submissions().find(id).await?.is_none() {
            violations.push(format!("{id} does not exist"));
        }
    }
    reject(violations)
}

fn record_failure(report: &mut BulkReport, operation: &'static str, id: &str, err: GradingError) {
    tracing::warn!(operation, submission_id = id, error = %err, "Bulk item failed; continuing");
    metrics::counter!("bulk_items_failed_total", "operation" => operation).increment(1);
    report.failed.push(BulkFailure { submission_id: id.to_string(), error: err.to_string() });
}

/// Releases each submission through the single-item path, continuing past failures.
///
/// Confirmed releases are announced together in one `GradesReleased` event.
pub async fn execute_bulk_release(state: &AppState, ids: &[String], performer_id: &str) -> BulkReport {
    let mut report = BulkReport::default();
    for id in ids {
        match grading_actions::release_without_event(state, id, performer_id).await {
            Ok(ReleaseOutcome::Released) => report.succeeded.push(id.clone()),
            Ok(ReleaseOutcome::AlreadyReleased) => report.skipped.push(id.clone()),
            Err(err) => record_failure(&mut report, "release", id, err),
        }
    }

    tracing::info!(
        performer_id,
        released = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Bulk release finished"
    );
    grading_actions::emit_released(state, report.succeeded.clone(), performer_id);
    report
}

/// Overwrites feedback on each existing grade. Submissions without a grade are skipped.
pub async fn execute_bulk_feedback(
    state: &AppState,
    ids: &[String],
    feedback: &str,
    performer_id: &str,
) -> BulkReport {
    let mut report = BulkReport::default();
    for id in ids {
        match state.grades().update_feedback(id, feedback).await {
            Ok(true) => report.succeeded.push(id.clone()),
            Ok(false) => report.skipped.push(id.clone()),
            Err(err) => record_failure(&mut report, "feedback", id, err),
        }
    }

    tracing::info!(
        performer_id,
        updated = report.succeeded.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Bulk feedback finished"
    );
    report
}

pub async fn handle_bulk_release(
    state: &AppState,
    request: BulkReleaseRequest,
    performer_id: &str,
) -> GradingResult<BulkOutcome> {
    request.validate()?;
    let ids = dedup(request.submission_ids);
    check_batch_size(state, &ids)?;
    validate_release_batch(state, &ids).await?;

    if request.run_async {
        let submission_count = ids.len();
        state
            .jobs()
            .dispatch(GradingJob::BulkReleaseGrades {
                submission_ids: ids,
                performer_id: performer_id.to_string(),
            })
            .await?;
        return Ok(BulkOutcome::Queued { submission_count });
    }

    Ok(BulkOutcome::Completed(execute_bulk_release(state, &ids, performer_id).await))
}

pub async fn handle_bulk_feedback(
    state: &AppState,
    request: BulkFeedbackRequest,
    performer_id: &str,
) -> GradingResult<BulkOutcome> {
    request.validate()?;
    let ids = dedup(request.submission_ids);
    check_batch_size(state, &ids)?;
    validate_existing(state, &ids).await?;

    let feedback = request.feedback.trim().to_string();
    if request.run_async {
        let submission_count = ids.len();
        state
            .jobs()
            .dispatch(GradingJob::BulkApplyFeedback {
                submission_ids: ids,
                feedback,
                performer_id: performer_id.to_string(),
            })
            .await?;
        return Ok(BulkOutcome::Queued { submission_count });
    }

    Ok(BulkOutcome::Completed(execute_bulk_feedback(state, &ids, &feedback, performer_id).await))
}
