pub(crate) const COLUMNS: &str = "\
    id, assignment_id, user_id, state, score, is_late, attempt_number, submitted_at, \
    state_changed_by, updated_at";

pub(crate) const PREFIXED_COLUMNS: &str = "\
    s.id, s.assignment_id, s.user_id, s.state, s.score, s.is_late, s.attempt_number, \
    s.submitted_at, s.state_changed_by, s.updated_at";

pub(crate) const ANSWER_COLUMNS: &str = "\
    a.id, a.submission_id, a.question_id, a.response, a.score, a.feedback, a.is_auto_graded";

/// Shared WHERE clause of the manual grading queue; `$1` is the queued state.
pub(crate) const PENDING_FILTER: &str = "\
    s.state = $1
    AND ($2::varchar IS NULL OR s.assignment_id = $2)
    AND ($3::varchar IS NULL OR s.user_id = $3)
    AND ($4::boolean IS NULL OR s.is_late = $4)
    AND ($5::timestamp IS NULL OR s.submitted_at >= $5)
    AND ($6::timestamp IS NULL OR s.submitted_at <= $6)
    AND ($7::varchar IS NULL
         OR s.id ILIKE $7
         OR s.user_id ILIKE $7
         OR asg.title ILIKE $7)";

pub(crate) const PENDING_ANSWERS: &str = "\
    SELECT a.submission_id, COUNT(*) AS pending_answers
    FROM answers a
    JOIN questions q ON q.id = a.question_id
    WHERE a.score IS NULL
      AND q.question_type IN ('essay', 'file_upload')
    GROUP BY a.submission_id";
