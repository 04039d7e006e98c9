use std::collections::HashMap;

use serde::Serialize;

use crate::core::state::AppState;
use crate::db::types::SubmissionState;
use crate::errors::{GradingError, GradingResult};
use crate::repositories::{AnswerUpdate, GradingCommit, StateChange};
use crate::services::state_machine::GradingStep;
use crate::services::{grade_calculator, grading_strategy};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoGradeOutcome {
    pub submission_id: String,
    pub score: f64,
    pub state: SubmissionState,
    pub auto_graded_answers: usize,
}

/// Scores every auto-gradable answer and routes the submission onward.
///
/// The submission lands in `PendingManualGrading` when any answer belongs to
/// a question a human has to grade, otherwise in `AutoGraded`. No grade
/// record is written here.
pub async fn execute(state: &AppState, submission_id: &str) -> GradingResult<AutoGradeOutcome> {
    let mut loaded = state
        .submissions()
        .find_with_answers(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    let questions = state.assignments().questions(&loaded.submission.assignment_id).await?;
    let by_id: HashMap<&str, _> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();

    let mut updates = Vec::new();
    let mut needs_manual = false;

    for answer in &mut loaded.answers {
        let Some(question) = by_id.get(answer.question_id.as_str()) else {
            tracing::warn!(
                submission_id,
                question_id = %answer.question_id,
                "Answer references an unknown question"
            );
            continue;
        };

        if !grading_strategy::can_auto_grade(question.question_type) {
            needs_manual = true;
            continue;
        }

        let score = grading_strategy::auto_grade(question, &answer.response.0);
        answer.score = score;
        answer.is_auto_graded = true;
        updates.push(AnswerUpdate {
            question_id: answer.question_id.clone(),
            score,
            feedback: answer.feedback.clone(),
            is_auto_graded: true,
        });
    }

    let score = grade_calculator::calculate_submission_score(&loaded.answers, &questions);
    let step = GradingStep::AutoGrade { needs_manual };
    let next = step.target();
    let auto_graded_answers = updates.len();

    let mut commit = GradingCommit::new(submission_id);
    commit.answers = updates;
    commit.score = Some(score);
    commit.transition = Some(StateChange::new(step, None));
    state.submissions().commit_grading(commit).await?;

    metrics::counter!("auto_graded_answers_total").increment(auto_graded_answers as u64);
    tracing::info!(
        submission_id,
        score,
        state = next.as_str(),
        auto_graded_answers,
        "Submission auto-graded"
    );

    Ok(AutoGradeOutcome {
        submission_id: submission_id.to_string(),
        score,
        state: next,
        auto_graded_answers,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::types::QuestionType;
    use crate::test_support::{
        self, answer_with_response, final_grade, question_with_key, TestContext,
    };

    fn seed_quiz(ctx: &TestContext, with_essay: bool) {
        ctx.seed_assignment("a1", 100.0);
        let mut mc = question_with_key("mc", QuestionType::MultipleChoice, 10.0, json!(["b"]));
        mc.weight = 1.0;
        ctx.store.insert_question(mc);
        ctx.store.insert_question(question_with_key("tf", QuestionType::TrueFalse, 10.0, json!(true)));
        ctx.store.insert_answer(answer_with_response("s1", "mc", json!(["b"])));
        ctx.store.insert_answer(answer_with_response("s1", "tf", json!(false)));
        if with_essay {
            ctx.store.insert_question(question_with_key("es", QuestionType::Essay, 20.0, json!(null)));
            ctx.store.insert_answer(answer_with_response("s1", "es", json!("an essay")));
        }
    }

    #[tokio::test]
    async fn all_auto_gradable_lands_in_auto_graded() {
        let ctx = test_support::setup();
        seed_quiz(&ctx, false);
        ctx.seed_submission("s1", "a1", "student", SubmissionState::PendingManualGrading);

        let outcome = execute(&ctx.state, "s1").await.expect("auto grade");

        assert_eq!(outcome.state, SubmissionState::AutoGraded);
        assert_eq!(outcome.auto_graded_answers, 2);
        assert_eq!(outcome.score, 50.0);

        let submission = ctx.store.submission("s1").expect("submission");
        assert_eq!(submission.state, SubmissionState::AutoGraded);
        assert_eq!(submission.score, Some(50.0));
        assert!(ctx.store.answers("s1").iter().all(|a| a.is_auto_graded && a.score.is_some()));
        assert!(ctx.store.grade("s1").is_none());
    }

    #[tokio::test]
    async fn essay_routes_to_manual_queue_with_partial_score() {
        let ctx = test_support::setup();
        seed_quiz(&ctx, true);
        ctx.seed_submission("s1", "a1", "student", SubmissionState::AutoGraded);

        let outcome = execute(&ctx.state, "s1").await.expect("auto grade");

        assert_eq!(outcome.state, SubmissionState::PendingManualGrading);
        assert_eq!(outcome.score, 50.0);

        let essay = ctx
            .store
            .answers("s1")
            .into_iter()
            .find(|a| a.question_id == "es")
            .expect("essay answer");
        assert_eq!(essay.score, None);
        assert!(!essay.is_auto_graded);
    }

    #[tokio::test]
    async fn graded_submission_is_not_reprocessed() {
        let ctx = test_support::setup();
        seed_quiz(&ctx, false);
        ctx.seed_submission("s1", "a1", "student", SubmissionState::Graded);

        let err = execute(&ctx.state, "s1").await.expect_err("illegal");
        assert!(matches!(err, GradingError::State(_)));
        assert!(ctx.store.answers("s1").iter().all(|a| a.score.is_none()));
    }

    #[tokio::test]
    async fn graded_submission_with_essay_stays_graded() {
        let ctx = test_support::setup();
        seed_quiz(&ctx, true);
        ctx.seed_submission("s1", "a1", "student", SubmissionState::Graded);
        ctx.store.insert_grade(final_grade("s1", Some(90.0)));

        let err = execute(&ctx.state, "s1").await.expect_err("graded work is final");
        assert!(matches!(err, GradingError::State(_)));

        let submission = ctx.store.submission("s1").expect("submission");
        assert_eq!(submission.state, SubmissionState::Graded);
        assert_eq!(submission.score, None);
        assert!(ctx.store.answers("s1").iter().all(|a| a.score.is_none() && !a.is_auto_graded));
        assert!(!ctx.store.grade("s1").expect("grade").is_draft);
    }

    #[tokio::test]
    async fn missing_submission_is_not_found() {
        let ctx = test_support::setup();
        let err = execute(&ctx.state, "nope").await.expect_err("missing");
        assert!(matches!(err, GradingError::NotFound(_)));
    }
}
