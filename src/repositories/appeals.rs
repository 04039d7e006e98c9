use sqlx::{PgExecutor, PgPool};

use crate::db::models::Appeal;
use crate::db::types::AppealStatus;
use crate::repositories::AppealDecision;

pub(crate) const COLUMNS: &str = "\
    id, submission_id, student_id, reason, status, supporting_documents, reviewer_id, \
    decision_reason, decided_at, created_at";

const PREFIXED_COLUMNS: &str = "\
    ap.id, ap.submission_id, ap.student_id, ap.reason, ap.status, ap.supporting_documents, \
    ap.reviewer_id, ap.decision_reason, ap.decided_at, ap.created_at";

pub(crate) async fn insert(
    executor: impl PgExecutor<'_>,
    appeal: &Appeal,
) -> Result<Appeal, sqlx::Error> {
    sqlx::query_as::<_, Appeal>(&format!(
        "INSERT INTO appeals ({COLUMNS})
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
         RETURNING {COLUMNS}"
    ))
    .bind(&appeal.id)
    .bind(&appeal.submission_id)
    .bind(&appeal.student_id)
    .bind(&appeal.reason)
    .bind(appeal.status)
    .bind(&appeal.supporting_documents)
    .bind(appeal.reviewer_id.as_deref())
    .bind(appeal.decision_reason.as_deref())
    .bind(appeal.decided_at)
    .bind(appeal.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<Appeal>, sqlx::Error> {
    sqlx::query_as::<_, Appeal>(&format!(
        "SELECT {COLUMNS}
         FROM appeals
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_submission(
    executor: impl PgExecutor<'_>,
    submission_id: &str,
) -> Result<Option<Appeal>, sqlx::Error> {
    sqlx::query_as::<_, Appeal>(&format!(
        "SELECT {COLUMNS}
         FROM appeals
         WHERE submission_id = $1"
    ))
    .bind(submission_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_pending_for_instructor(
    pool: &PgPool,
    instructor_id: &str,
) -> Result<Vec<Appeal>, sqlx::Error> {
    sqlx::query_as::<_, Appeal>(&format!(
        "SELECT {PREFIXED_COLUMNS}
         FROM appeals ap
         JOIN submissions s ON s.id = ap.submission_id
         JOIN assignments asg ON asg.id = s.assignment_id
         WHERE ap.status = $1
           AND asg.created_by = $2
         ORDER BY ap.created_at ASC"
    ))
    .bind(AppealStatus::Pending)
    .bind(instructor_id)
    .fetch_all(pool)
    .await
}

/// Returns `None` when the appeal is missing or no longer pending.
pub(crate) async fn decide(
    executor: impl PgExecutor<'_>,
    decision: &AppealDecision,
) -> Result<Option<Appeal>, sqlx::Error> {
    sqlx::query_as::<_, Appeal>(&format!(
        "UPDATE appeals
         SET status = $1,
             reviewer_id = $2,
             decision_reason = $3,
             decided_at = $4
         WHERE id = $5
           AND status = $6
         RETURNING {COLUMNS}"
    ))
    .bind(decision.status)
    .bind(&decision.reviewer_id)
    .bind(decision.decision_reason.as_deref())
    .bind(decision.decided_at)
    .bind(&decision.appeal_id)
    .bind(AppealStatus::Pending)
    .fetch_optional(executor)
    .await
}
