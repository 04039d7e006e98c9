use sqlx::types::Json;
use time::PrimitiveDateTime;
use validator::Validate;

use crate::core::state::AppState;
use crate::core::time::{minutes, primitive_now_utc};
use crate::db::models::{Appeal, Assignment, StoredDocument, Submission};
use crate::db::types::AppealStatus;
use crate::errors::{GradingError, GradingResult};
use crate::repositories::AppealDecision;
use crate::schemas::appeal::{AppealUpload, DenyAppealRequest, SubmitAppealRequest};
use crate::services::events::GradingEvent;

/// A submission may be appealed when its assignment has a deadline and the
/// submission is flagged late or the tolerance window has passed.
pub fn is_eligible_for_appeal(
    submission: &Submission,
    assignment: &Assignment,
    default_tolerance_minutes: i64,
    now: PrimitiveDateTime,
) -> bool {
    let Some(deadline) = assignment.deadline_at else {
        return false;
    };
    let tolerance = assignment
        .tolerance_window_minutes
        .map(i64::from)
        .unwrap_or(default_tolerance_minutes);

    submission.is_late || now > deadline + minutes(tolerance)
}

async fn discard_documents(state: &AppState, documents: &[StoredDocument]) {
    let Some(files) = state.files() else {
        return;
    };
    for document in documents {
        if let Err(err) = files.delete(&document.path).await {
            tracing::error!(path = %document.path, error = %err, "Failed to remove appeal document");
        }
    }
}

async fn store_documents(
    state: &AppState,
    submission_id: &str,
    uploads: &[AppealUpload],
) -> GradingResult<Vec<StoredDocument>> {
    if uploads.is_empty() {
        return Ok(Vec::new());
    }
    let Some(files) = state.files() else {
        return Err(GradingError::Internal("File storage is not configured".to_string()));
    };

    let prefix = format!("appeals/{submission_id}");
    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match files.store(&prefix, upload).await {
            Ok(document) => stored.push(document),
            Err(err) => {
                discard_documents(state, &stored).await;
                return Err(GradingError::internal(err, "Failed to store appeal document"));
            }
        }
    }
    Ok(stored)
}

pub async fn submit_appeal(
    state: &AppState,
    submission_id: &str,
    student_id: &str,
    request: SubmitAppealRequest,
) -> GradingResult<Appeal> {
    request.validate()?;

    let submission = state
        .submissions()
        .find(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    if state.appeals().find_by_submission(submission_id).await?.is_some() {
        return Err(GradingError::Eligibility(format!(
            "an appeal already exists for submission {submission_id}"
        )));
    }
    let assignment = state
        .assignments()
        .find(&submission.assignment_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Assignment", &submission.assignment_id))?;

    let now = primitive_now_utc();
    if !is_eligible_for_appeal(&submission, &assignment, state.grading().appeal_tolerance_minutes, now)
    {
        return Err(GradingError::Eligibility(format!(
            "submission {submission_id} was neither late nor past the tolerance window"
        )));
    }

    let documents = store_documents(state, submission_id, &request.documents).await?;
    let appeal = Appeal {
        id: uuid::Uuid::new_v4().to_string(),
        submission_id: submission_id.to_string(),
        student_id: student_id.to_string(),
        reason: request.reason.trim().to_string(),
        status: AppealStatus::Pending,
        supporting_documents: Json(documents),
        reviewer_id: None,
        decision_reason: None,
        decided_at: None,
        created_at: now,
    };

    let appeal = match state.appeals().create(&appeal).await {
        Ok(created) => created,
        Err(err) => {
            discard_documents(state, &appeal.supporting_documents.0).await;
            return Err(err);
        }
    };

    tracing::info!(
        appeal_id = %appeal.id,
        submission_id,
        student_id,
        documents = appeal.supporting_documents.0.len(),
        "Appeal submitted"
    );
    metrics::counter!("appeals_submitted_total").increment(1);
    state.events().emit(GradingEvent::AppealSubmitted {
        appeal_id: appeal.id.clone(),
        submission_id: submission_id.to_string(),
        student_id: student_id.to_string(),
        recipient_id: assignment.created_by,
    });

    Ok(appeal)
}

async fn pending_appeal(state: &AppState, appeal_id: &str) -> GradingResult<Appeal> {
    let appeal = state
        .appeals()
        .find_by_id(appeal_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Appeal", appeal_id))?;
    if appeal.status.is_decided() {
        return Err(GradingError::State(format!("appeal {appeal_id} has already been decided")));
    }
    Ok(appeal)
}

async fn decide(
    state: &AppState,
    appeal_id: &str,
    instructor_id: &str,
    status: AppealStatus,
    decision_reason: Option<String>,
) -> GradingResult<Appeal> {
    let appeal = state
        .appeals()
        .decide(AppealDecision {
            appeal_id: appeal_id.to_string(),
            status,
            reviewer_id: instructor_id.to_string(),
            decision_reason,
            decided_at: primitive_now_utc(),
        })
        .await?;

    let status_label = if status == AppealStatus::Approved { "approved" } else { "denied" };
    tracing::info!(appeal_id, instructor_id, status = status_label, "Appeal decided");
    metrics::counter!("appeals_decided_total", "status" => status_label).increment(1);
    state.events().emit(GradingEvent::AppealDecided {
        appeal_id: appeal.id.clone(),
        submission_id: appeal.submission_id.clone(),
        student_id: appeal.student_id.clone(),
        status,
        reviewer_id: instructor_id.to_string(),
    });

    Ok(appeal)
}

/// Approves a pending appeal and clears the submission's lateness flag.
///
/// The score is left as is; reversing a penalty takes a fresh manual grade.
pub async fn approve_appeal(
    state: &AppState,
    appeal_id: &str,
    instructor_id: &str,
) -> GradingResult<Appeal> {
    pending_appeal(state, appeal_id).await?;
    decide(state, appeal_id, instructor_id, AppealStatus::Approved, None).await
}

pub async fn deny_appeal(
    state: &AppState,
    appeal_id: &str,
    instructor_id: &str,
    request: DenyAppealRequest,
) -> GradingResult<Appeal> {
    request.validate()?;
    pending_appeal(state, appeal_id).await?;
    let reason = request.reason.trim().to_string();
    decide(state, appeal_id, instructor_id, AppealStatus::Denied, Some(reason)).await
}

pub async fn get_pending_appeals(state: &AppState, instructor_id: &str) -> GradingResult<Vec<Appeal>> {
    state.appeals().find_pending_for_instructor(instructor_id).await
}
