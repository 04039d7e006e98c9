use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use crate::db::types::SubmissionState;
use crate::repositories::AnswerUpdate;

pub(crate) async fn update_score(
    executor: impl PgExecutor<'_>,
    id: &str,
    score: Option<f64>,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET score = $1,
             updated_at = $2
         WHERE id = $3",
    )
    .bind(score)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn set_late(
    executor: impl PgExecutor<'_>,
    id: &str,
    is_late: bool,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET is_late = $1,
             updated_at = $2
         WHERE id = $3",
    )
    .bind(is_late)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Moves the submission only while its current state is one of `sources`.
pub(crate) async fn transition(
    executor: impl PgExecutor<'_>,
    id: &str,
    to: SubmissionState,
    sources: &[SubmissionState],
    actor_id: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let sources: Vec<&str> = sources.iter().map(|state| state.as_str()).collect();

    let updated = sqlx::query(
        "UPDATE submissions
         SET state = $1,
             state_changed_by = $2,
             updated_at = $3
         WHERE id = $4
           AND state::text = ANY($5)",
    )
    .bind(to)
    .bind(actor_id)
    .bind(now)
    .bind(id)
    .bind(&sources)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn update_answer(
    executor: impl PgExecutor<'_>,
    submission_id: &str,
    update: &AnswerUpdate,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE answers
         SET score = $1,
             feedback = $2,
             is_auto_graded = $3
         WHERE submission_id = $4 AND question_id = $5",
    )
    .bind(update.score)
    .bind(update.feedback.as_deref())
    .bind(update.is_auto_graded)
    .bind(submission_id)
    .bind(&update.question_id)
    .execute(executor)
    .await?;

    Ok(updated.rows_affected() > 0)
}
