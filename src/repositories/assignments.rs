use sqlx::PgPool;

use crate::db::models::{Assignment, Question};

pub(crate) const COLUMNS: &str = "\
    id, course_id, title, created_by, max_score, deadline_at, tolerance_window_minutes, \
    late_penalty_percent, question_set, created_at";

pub(crate) const QUESTION_COLUMNS: &str = "\
    id, assignment_id, question_type, weight, max_score, answer_key, order_index";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS}
         FROM assignments
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    assignment_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS}
         FROM questions
         WHERE assignment_id = $1
         ORDER BY order_index, id"
    ))
    .bind(assignment_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS}
         FROM assignments
         WHERE course_id = $1
         ORDER BY created_at, id"
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await
}
