use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::Grade;

pub(crate) const COLUMNS: &str = "\
    id, submission_id, source_type, source_id, score, max_score, is_draft, feedback, \
    graded_by, graded_at, released_at, override_reason, overridden_by, created_at, updated_at";

pub(crate) async fn upsert(
    executor: impl PgExecutor<'_>,
    grade: &Grade,
) -> Result<Grade, sqlx::Error> {
    sqlx::query_as::<_, Grade>(&format!(
        "INSERT INTO grades ({COLUMNS})
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
         ON CONFLICT (submission_id) DO UPDATE
         SET source_type = EXCLUDED.source_type,
             source_id = EXCLUDED.source_id,
             score = EXCLUDED.score,
             max_score = EXCLUDED.max_score,
             is_draft = EXCLUDED.is_draft,
             feedback = EXCLUDED.feedback,
             graded_by = EXCLUDED.graded_by,
             graded_at = EXCLUDED.graded_at,
             released_at = EXCLUDED.released_at,
             override_reason = EXCLUDED.override_reason,
             overridden_by = EXCLUDED.overridden_by,
             updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(&grade.id)
    .bind(&grade.submission_id)
    .bind(&grade.source_type)
    .bind(&grade.source_id)
    .bind(grade.score)
    .bind(grade.max_score)
    .bind(grade.is_draft)
    .bind(grade.feedback.as_deref())
    .bind(grade.graded_by.as_deref())
    .bind(grade.graded_at)
    .bind(grade.released_at)
    .bind(grade.override_reason.as_deref())
    .bind(grade.overridden_by.as_deref())
    .bind(grade.created_at)
    .bind(grade.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_submission(
    executor: impl PgExecutor<'_>,
    submission_id: &str,
) -> Result<Option<Grade>, sqlx::Error> {
    sqlx::query_as::<_, Grade>(&format!(
        "SELECT {COLUMNS}
         FROM grades
         WHERE submission_id = $1"
    ))
    .bind(submission_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_submissions(
    pool: &PgPool,
    submission_ids: &[String],
) -> Result<Vec<Grade>, sqlx::Error> {
    if submission_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Grade>(&format!(
        "SELECT {COLUMNS}
         FROM grades
         WHERE submission_id = ANY($1)"
    ))
    .bind(submission_ids)
    .fetch_all(pool)
    .await
}

pub(crate) async fn update_feedback(
    executor: impl PgExecutor<'_>,
    submission_id: &str,
    feedback: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE grades
         SET feedback = $1,
             updated_at = $2
         WHERE submission_id = $3",
    )
    .bind(feedback)
    .bind(now)
    .bind(submission_id)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}
