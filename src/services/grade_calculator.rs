//! Scoring math. Nothing here touches storage.

use std::collections::HashMap;

use crate::db::models::{Answer, Assignment, Grade, Question, Submission, GRADE_MAX_SCORE};
use crate::db::types::SubmissionState;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted percentage over the scored answers.
///
/// Answers without a score or without a matching question are ignored. A
/// submission with no counted weight scores `0.0`.
pub fn calculate_submission_score(answers: &[Answer], questions: &[Question]) -> f64 {
    let by_id: HashMap<&str, &Question> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();

    let mut total_weighted_score = 0.0;
    let mut total_weight = 0.0;

    for answer in answers {
        let Some(score) = answer.score else {
            continue;
        };
        let Some(question) = by_id.get(answer.question_id.as_str()) else {
            continue;
        };
        if question.max_score <= 0.0 {
            continue;
        }

        let normalized = (score / question.max_score) * GRADE_MAX_SCORE;
        total_weighted_score += normalized * question.weight;
        total_weight += question.weight;
    }

    if total_weight <= 0.0 {
        return 0.0;
    }

    round2(total_weighted_score / total_weight)
}

/// Falls back to `default_percent` when the assignment sets no penalty.
pub fn apply_late_penalty(score: f64, penalty_percent: Option<f64>, default_percent: f64) -> f64 {
    let penalty = penalty_percent.unwrap_or(default_percent);
    if penalty <= 0.0 {
        return score;
    }

    (score - score * penalty / 100.0).max(0.0)
}

fn qualifying_score(submission: &Submission, grade: Option<&Grade>) -> Option<f64> {
    if submission.state == SubmissionState::InProgress {
        return None;
    }
    let grade = grade.filter(|grade| !grade.is_draft)?;
    grade.score.or(submission.score)
}

/// Course percentage for one student, weighted by each assignment's `max_score`.
///
/// Each assignment counts the student's best qualifying attempt. Assignments
/// the student has no qualifying attempt for still carry their weight.
pub fn calculate_course_score(
    assignments: &[Assignment],
    student_id: &str,
    submissions: &[Submission],
    grades: &[Grade],
) -> f64 {
    let grades_by_submission: HashMap<&str, &Grade> =
        grades.iter().map(|grade| (grade.submission_id.as_str(), grade)).collect();

    let mut sum = 0.0;
    let mut total_weight = 0.0;

    for assignment in assignments {
        let best = submissions
            .iter()
            .filter(|s| s.user_id == student_id && s.assignment_id == assignment.id)
            .filter_map(|s| qualifying_score(s, grades_by_submission.get(s.id.as_str()).copied()))
            .fold(None, |best: Option<f64>, score| Some(best.map_or(score, |b| b.max(score))));

        total_weight += assignment.max_score;
        if let Some(best) = best {
            sum += (best / GRADE_MAX_SCORE) * assignment.max_score;
        }
    }

    if total_weight <= 0.0 {
        return 0.0;
    }

    round2((sum / total_weight) * 100.0)
}
