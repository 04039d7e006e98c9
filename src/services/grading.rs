use validator::Validate;

use crate::core::state::AppState;
use crate::db::models::Grade;
use crate::errors::{GradingError, GradingResult};
use crate::repositories::{GradingCommit, StateChange};
use crate::schemas::grading::ManualGradeRequest;
use crate::services::grade_calculator::{
    apply_late_penalty, calculate_course_score, calculate_submission_score,
};
use crate::services::grading_actions::{emit_grade_created, finalized_grade, prepare_answer_updates};
use crate::services::state_machine::GradingStep;

/// Finishes manual grading of one submission.
///
/// Answer scores, the submission score, the grade and the move to `Graded`
/// are written in one commit. Without `score_override` every answer must
/// carry a score. An override on a late submission has the late penalty
/// applied.
pub async fn manual_grade(
    state: &AppState,
    submission_id: &str,
    request: ManualGradeRequest,
    grader_id: &str,
) -> GradingResult<Grade> {
    request.validate()?;

    let mut loaded = state
        .submissions()
        .find_with_answers(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    GradingStep::CompleteManual.ensure_from(loaded.submission.state)?;

    let assignment_id = loaded.submission.assignment_id.clone();
    let assignment = state
        .assignments()
        .find(&assignment_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Assignment", &assignment_id))?;
    let questions = state.assignments().questions(&assignment_id).await?;

    let updates = prepare_answer_updates(&mut loaded.answers, &questions, &request.answers)?;

    let score = match request.score_override {
        Some(score) if loaded.submission.is_late => apply_late_penalty(
            score,
            assignment.late_penalty_percent,
            state.grading().default_late_penalty_percent,
        ),
        Some(score) => score,
        None => {
            let missing = loaded.answers.iter().filter(|answer| answer.score.is_none()).count();
            if missing > 0 {
                return Err(GradingError::Validation(format!(
                    "grading incomplete: {missing} of {} answers still need a score",
                    loaded.answers.len()
                )));
            }
            calculate_submission_score(&loaded.answers, &questions)
        }
    };

    let existing = state.grades().find_by_submission(submission_id).await?;
    let grade =
        finalized_grade(existing, &loaded.submission, score, Some(grader_id), request.feedback);

    let mut commit = GradingCommit::new(submission_id);
    commit.answers = updates;
    commit.score = Some(score);
    commit.grade = Some(grade.clone());
    commit.transition = Some(StateChange::new(GradingStep::CompleteManual, Some(grader_id)));
    state.submissions().commit_grading(commit).await?;

    tracing::info!(
        submission_id,
        grader_id,
        score,
        overridden = request.score_override.is_some(),
        "Submission graded"
    );
    metrics::counter!("manual_grades_total").increment(1);
    emit_grade_created(state, &grade, Some(grader_id));

    Ok(grade)
}

/// Course percentage for a student across every assignment in the course.
pub async fn course_score_for_student(
    state: &AppState,
    course_id: &str,
    student_id: &str,
) -> GradingResult<f64> {
    let assignments = state.assignments().list_by_course(course_id).await?;
    if assignments.is_empty() {
        return Ok(0.0);
    }

    let assignment_ids: Vec<String> =
        assignments.iter().map(|assignment| assignment.id.clone()).collect();
    let submissions = state.submissions().list_for_student(student_id, &assignment_ids).await?;
    let submission_ids: Vec<String> =
        submissions.iter().map(|submission| submission.id.clone()).collect();
    let grades = state.grades().find_by_submissions(&submission_ids).await?;

    Ok(calculate_course_score(&assignments, student_id, &submissions, &grades))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::db::types::{QuestionType, SubmissionState};
    use crate::schemas::grading::AnswerInput;
    use crate::services::events::GradingEvent;
    use crate::test_support::{self, answer, final_grade, question, TestContext};

    fn seed(ctx: &TestContext, late: bool) {
        let mut assignment = test_support::assignment("a1", 100.0);
        assignment.late_penalty_percent = Some(20.0);
        ctx.store.insert_assignment(assignment);
        ctx.store.insert_question(question("q1", "a1", QuestionType::Essay, 1.0, 100.0));
        ctx.store.insert_question(question("q2", "a1", QuestionType::Essay, 3.0, 100.0));
        ctx.store.insert_answer(answer("s1", "q1", None));
        ctx.store.insert_answer(answer("s1", "q2", None));
        let mut submission =
            test_support::submission("s1", "a1", "student", SubmissionState::PendingManualGrading);
        submission.is_late = late;
        ctx.store.insert_submission(submission);
    }

    fn scores(entries: &[(&str, f64)]) -> BTreeMap<String, AnswerInput> {
        entries.iter().map(|(id, score)| (id.to_string(), AnswerInput::scored(*score))).collect()
    }

    #[tokio::test]
    async fn weighted_manual_grade_end_to_end() {
        let ctx = test_support::setup();
        seed(&ctx, false);

        let request = ManualGradeRequest {
            answers: scores(&[("q1", 80.0), ("q2", 60.0)]),
            ..ManualGradeRequest::default()
        };
        let grade = manual_grade(&ctx.state, "s1", request, "t-1").await.expect("grade");

        assert_eq!(grade.score, Some(65.0));
        assert!(!grade.is_draft);
        let submission = ctx.store.submission("s1").expect("s1");
        assert_eq!(submission.state, SubmissionState::Graded);
        assert_eq!(submission.score, Some(65.0));
        assert!(matches!(ctx.events.events().as_slice(), [GradingEvent::GradeCreated { .. }]));
    }

    #[tokio::test]
    async fn incomplete_grading_without_override_is_rejected() {
        let ctx = test_support::setup();
        seed(&ctx, false);

        let request = ManualGradeRequest {
            answers: scores(&[("q1", 80.0)]),
            ..ManualGradeRequest::default()
        };
        let err = manual_grade(&ctx.state, "s1", request, "t-1").await.expect_err("incomplete");

        assert!(matches!(err, GradingError::Validation(ref m) if m.contains("incomplete")));
        let submission = ctx.store.submission("s1").expect("s1");
        assert_eq!(submission.state, SubmissionState::PendingManualGrading);
        assert!(ctx.store.answers("s1").iter().all(|a| a.score.is_none()));
        assert!(ctx.store.grade("s1").is_none());
    }

    #[tokio::test]
    async fn override_completes_grading_and_applies_late_penalty() {
        let ctx = test_support::setup();
        seed(&ctx, true);

        let request = ManualGradeRequest {
            answers: scores(&[("q1", 50.0)]),
            score_override: Some(90.0),
            feedback: Some("late but good".into()),
        };
        let grade = manual_grade(&ctx.state, "s1", request, "t-1").await.expect("grade");

        assert_eq!(grade.score, Some(72.0));
        assert_eq!(grade.feedback.as_deref(), Some("late but good"));
        assert_eq!(ctx.store.submission("s1").expect("s1").state, SubmissionState::Graded);
    }

    #[tokio::test]
    async fn out_of_bounds_answer_leaves_submission_untouched() {
        let ctx = test_support::setup();
        seed(&ctx, false);

        let request = ManualGradeRequest {
            answers: scores(&[("q1", 80.0), ("q2", 101.0)]),
            ..ManualGradeRequest::default()
        };
        let err = manual_grade(&ctx.state, "s1", request, "t-1").await.expect_err("bound");

        assert!(matches!(err, GradingError::Validation(_)));
        assert!(ctx.store.answers("s1").iter().all(|a| a.score.is_none()));
    }

    #[tokio::test]
    async fn second_grader_loses_the_race() {
        let ctx = test_support::setup();
        seed(&ctx, false);

        let request = ManualGradeRequest {
            answers: scores(&[("q1", 80.0), ("q2", 60.0)]),
            ..ManualGradeRequest::default()
        };
        manual_grade(&ctx.state, "s1", request.clone(), "t-1").await.expect("first");
        let err = manual_grade(&ctx.state, "s1", request, "t-2").await.expect_err("second");

        assert!(matches!(err, GradingError::State(_)));
        assert_eq!(ctx.store.grade("s1").expect("grade").graded_by.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn course_score_prefers_best_attempt() {
        let ctx = test_support::setup();
        ctx.seed_assignment("a1", 100.0);
        ctx.seed_submission("s1", "a1", "student", SubmissionState::Graded);
        ctx.seed_submission("s2", "a1", "student", SubmissionState::Released);
        ctx.store.insert_grade(final_grade("s1", Some(55.0)));
        ctx.store.insert_grade(final_grade("s2", Some(91.5)));

        let score = course_score_for_student(&ctx.state, "c1", "student").await.expect("score");
        assert_eq!(score, 91.5);
        assert_eq!(course_score_for_student(&ctx.state, "empty", "student").await.expect("score"), 0.0);
    }
}
