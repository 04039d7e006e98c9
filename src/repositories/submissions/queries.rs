use sqlx::{PgExecutor, PgPool};

use crate::db::models::{Answer, Submission};
use crate::db::types::SubmissionState;
use crate::repositories::QueuedSubmission;
use crate::schemas::grading::QueueFilter;

use super::types::{ANSWER_COLUMNS, COLUMNS, PENDING_ANSWERS, PENDING_FILTER, PREFIXED_COLUMNS};

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_answers(
    executor: impl PgExecutor<'_>,
    submission_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {ANSWER_COLUMNS}
         FROM answers a
         LEFT JOIN questions q ON q.id = a.question_id
         WHERE a.submission_id = $1
         ORDER BY q.order_index NULLS LAST, a.id"
    ))
    .bind(submission_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_pending_manual(
    pool: &PgPool,
    filter: &QueueFilter,
    skip: i64,
    limit: i64,
) -> Result<(Vec<QueuedSubmission>, i64), sqlx::Error> {
    let search = filter.search_term().map(|term| format!("%{term}%"));

    let items = sqlx::query_as::<_, QueuedSubmission>(&format!(
        "WITH pending AS ({PENDING_ANSWERS})
         SELECT {PREFIXED_COLUMNS}, p.pending_answers
         FROM submissions s
         JOIN pending p ON p.submission_id = s.id
         JOIN assignments asg ON asg.id = s.assignment_id
         WHERE {PENDING_FILTER}
         ORDER BY s.submitted_at ASC, s.id ASC
         OFFSET $8 LIMIT $9"
    ))
    .bind(SubmissionState::PendingManualGrading)
    .bind(filter.assignment_id.as_deref())
    .bind(filter.user_id.as_deref())
    .bind(filter.is_late)
    .bind(filter.submitted_from)
    .bind(filter.submitted_to)
    .bind(search.as_deref())
    .bind(skip)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let total_count = sqlx::query_scalar::<_, i64>(&format!(
        "WITH pending AS ({PENDING_ANSWERS})
         SELECT COUNT(*)
         FROM submissions s
         JOIN pending p ON p.submission_id = s.id
         JOIN assignments asg ON asg.id = s.assignment_id
         WHERE {PENDING_FILTER}"
    ))
    .bind(SubmissionState::PendingManualGrading)
    .bind(filter.assignment_id.as_deref())
    .bind(filter.user_id.as_deref())
    .bind(filter.is_late)
    .bind(filter.submitted_from)
    .bind(filter.submitted_to)
    .bind(search.as_deref())
    .fetch_one(pool)
    .await?;

    Ok((items, total_count))
}

pub(crate) async fn list_for_student(
    pool: &PgPool,
    student_id: &str,
    assignment_ids: &[String],
) -> Result<Vec<Submission>, sqlx::Error> {
    if assignment_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE user_id = $1
           AND assignment_id = ANY($2)
         ORDER BY assignment_id, attempt_number"
    ))
    .bind(student_id)
    .bind(assignment_ids)
    .fetch_all(pool)
    .await
}
