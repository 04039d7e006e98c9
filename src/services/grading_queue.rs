use std::collections::HashSet;

use validator::Validate;

use crate::core::state::AppState;
use crate::db::models::Grade;
use crate::errors::{GradingError, GradingResult};
use crate::repositories::QueuedSubmission;
use crate::schemas::grading::{GradingStatusDetails, PaginatedResponse, QueueFilter};

/// Submissions with essay or upload answers still waiting for a score, oldest first.
pub async fn list_pending(
    state: &AppState,
    filter: QueueFilter,
) -> GradingResult<PaginatedResponse<QueuedSubmission>> {
    filter.validate()?;

    let skip = filter.skip.unwrap_or(0);
    let limit = filter.limit.unwrap_or(state.grading().queue_page_limit);
    let (items, total_count) =
        state.submissions().list_pending_manual(&filter, skip, limit).await?;

    Ok(PaginatedResponse { items, total_count, skip, limit })
}

pub async fn get_grading_status_details(
    state: &AppState,
    submission_id: &str,
) -> GradingResult<GradingStatusDetails> {
    let loaded = state
        .submissions()
        .find_with_answers(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    let assignment = state.assignments().find(&loaded.submission.assignment_id).await?;

    let scope: Option<HashSet<&str>> = assignment
        .as_ref()
        .and_then(|assignment| assignment.question_set.as_ref())
        .filter(|set| !set.0.is_empty())
        .map(|set| set.0.iter().map(String::as_str).collect());

    let counted: Vec<_> = loaded
        .answers
        .iter()
        .filter(|answer| {
            scope.as_ref().map_or(true, |scope| scope.contains(answer.question_id.as_str()))
        })
        .collect();
    let total_count = counted.len();
    let graded_count = counted.iter().filter(|answer| answer.score.is_some()).count();
    let is_complete = graded_count == total_count;

    let grade = state.grades().find_by_submission(submission_id).await?;
    let can_release = is_complete && grade.is_some_and(|grade| !grade.is_draft);

    Ok(GradingStatusDetails {
        submission_id: submission_id.to_string(),
        state: loaded.submission.state,
        graded_count,
        total_count,
        is_complete,
        can_release,
    })
}

pub async fn get_draft_grade(state: &AppState, submission_id: &str) -> GradingResult<Option<Grade>> {
    Ok(state
        .grades()
        .find_by_submission(submission_id)
        .await?
        .filter(|grade| grade.is_draft))
}
