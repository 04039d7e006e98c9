use std::collections::HashMap;

use time::PrimitiveDateTime;
use validator::Validate;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{
    Answer, Grade, Question, Submission, GRADE_MAX_SCORE, GRADE_SOURCE_ASSIGNMENT,
};
use crate::db::types::SubmissionState;
use crate::errors::{GradingError, GradingResult};
use crate::repositories::{AnswerUpdate, GradingCommit, StateChange};
use crate::schemas::grading::{
    AnswersByQuestion, OverrideGradeRequest, ReleaseOutcome, SaveDraftRequest,
};
use crate::services::events::GradingEvent;
use crate::services::grade_calculator;
use crate::services::state_machine::GradingStep;

/// Checks grader input against the submission's answers and question bounds.
///
/// A missing `score` keeps the stored score; a missing `feedback` keeps the
/// stored feedback. Entering a score clears the auto-graded flag. `answers`
/// is updated in place so callers can aggregate before persisting.
pub fn prepare_answer_updates(
    answers: &mut [Answer],
    questions: &[Question],
    input: &AnswersByQuestion,
) -> GradingResult<Vec<AnswerUpdate>> {
    let by_id: HashMap<&str, &Question> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();
    let mut updates = Vec::with_capacity(input.len());

    for (question_id, entry) in input {
        let question = by_id
            .get(question_id.as_str())
            .ok_or_else(|| GradingError::not_found("Question", question_id))?;
        let answer = answers
            .iter_mut()
            .find(|answer| &answer.question_id == question_id)
            .ok_or_else(|| GradingError::not_found("Answer for question", question_id))?;

        if let Some(score) = entry.score {
            if !score.is_finite() || score < 0.0 || score > question.max_score {
                return Err(GradingError::Validation(format!(
                    "score {score} for question {question_id} must be between 0 and {}",
                    question.max_score
                )));
            }
            answer.score = Some(score);
            answer.is_auto_graded = false;
        }
        if let Some(feedback) = &entry.feedback {
            answer.feedback = Some(feedback.clone());
        }

        updates.push(AnswerUpdate {
            question_id: question_id.clone(),
            score: answer.score,
            feedback: answer.feedback.clone(),
            is_auto_graded: answer.is_auto_graded,
        });
    }

    Ok(updates)
}

/// Validates and stores per-question scores and feedback for one submission.
pub async fn process_answers(
    state: &AppState,
    submission_id: &str,
    input: &AnswersByQuestion,
) -> GradingResult<Vec<AnswerUpdate>> {
    let mut loaded = state
        .submissions()
        .find_with_answers(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    let questions = state.assignments().questions(&loaded.submission.assignment_id).await?;

    let updates = prepare_answer_updates(&mut loaded.answers, &questions, input)?;
    state.submissions().update_answers(submission_id, &updates).await?;
    Ok(updates)
}

fn blank_grade(submission: &Submission, now: PrimitiveDateTime) -> Grade {
    Grade {
        id: uuid::Uuid::new_v4().to_string(),
        submission_id: submission.id.clone(),
        source_type: GRADE_SOURCE_ASSIGNMENT.to_string(),
        source_id: submission.assignment_id.clone(),
        score: None,
        max_score: GRADE_MAX_SCORE,
        is_draft: true,
        feedback: None,
        graded_by: None,
        graded_at: None,
        released_at: None,
        override_reason: None,
        overridden_by: None,
        created_at: now,
        updated_at: now,
    }
}

/// The finalized grade for `submission`, reusing the existing row's identity.
pub fn finalized_grade(
    existing: Option<Grade>,
    submission: &Submission,
    score: f64,
    grader_id: Option<&str>,
    feedback: Option<String>,
) -> Grade {
    let now = primitive_now_utc();
    let mut grade = existing.unwrap_or_else(|| blank_grade(submission, now));
    grade.score = Some(score);
    grade.is_draft = false;
    grade.graded_at = Some(now);
    grade.updated_at = now;
    if let Some(grader_id) = grader_id {
        grade.graded_by = Some(grader_id.to_string());
    }
    if feedback.is_some() {
        grade.feedback = feedback;
    }
    grade
}

pub(crate) fn emit_grade_created(state: &AppState, grade: &Grade, grader_id: Option<&str>) {
    let Some(grader_id) = grader_id else {
        return;
    };
    state.events().emit(GradingEvent::GradeCreated {
        submission_id: grade.submission_id.clone(),
        grade_id: grade.id.clone(),
        score: grade.score,
        grader_id: grader_id.to_string(),
    });
}

/// Upserts the submission's final grade and keeps `submission.score` in step.
pub async fn persist_grade(
    state: &AppState,
    submission: &Submission,
    score: f64,
    grader_id: Option<&str>,
    feedback: Option<String>,
) -> GradingResult<Grade> {
    let existing = state.grades().find_by_submission(&submission.id).await?;
    let grade = finalized_grade(existing, submission, score, grader_id, feedback);

    let mut commit = GradingCommit::new(&submission.id);
    commit.score = Some(score);
    commit.grade = Some(grade.clone());
    state.submissions().commit_grading(commit).await?;

    emit_grade_created(state, &grade, grader_id);
    Ok(grade)
}

pub async fn save_draft(
    state: &AppState,
    submission_id: &str,
    request: SaveDraftRequest,
    grader_id: &str,
) -> GradingResult<Grade> {
    request.validate()?;

    let mut loaded = state
        .submissions()
        .find_with_answers(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    let existing = state.grades().find_by_submission(submission_id).await?;
    if existing.as_ref().is_some_and(|grade| !grade.is_draft) {
        return Err(GradingError::State(format!(
            "submission {submission_id} already has a finalized grade"
        )));
    }

    let questions = state.assignments().questions(&loaded.submission.assignment_id).await?;
    let updates = prepare_answer_updates(&mut loaded.answers, &questions, &request.answers)?;

    let now = primitive_now_utc();
    let mut grade = existing.unwrap_or_else(|| blank_grade(&loaded.submission, now));
    grade.score = loaded
        .answers
        .iter()
        .any(|answer| answer.score.is_some())
        .then(|| grade_calculator::calculate_submission_score(&loaded.answers, &questions));
    grade.graded_by = Some(grader_id.to_string());
    grade.updated_at = now;
    if request.feedback.is_some() {
        grade.feedback = request.feedback;
    }

    let mut commit = GradingCommit::new(submission_id);
    commit.answers = updates;
    commit.grade = Some(grade.clone());
    state.submissions().commit_grading(commit).await?;

    tracing::info!(submission_id, grader_id, "Draft grade saved");
    Ok(grade)
}

pub async fn override_grade(
    state: &AppState,
    submission_id: &str,
    request: OverrideGradeRequest,
    instructor_id: &str,
) -> GradingResult<Grade> {
    request.validate()?;

    state
        .submissions()
        .find(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    let mut grade = state
        .grades()
        .find_by_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Grade for submission", submission_id))?;

    let old_score = grade.score;
    let reason = request.reason.trim().to_string();
    grade.score = Some(request.new_score);
    grade.override_reason = Some(reason.clone());
    grade.overridden_by = Some(instructor_id.to_string());
    grade.updated_at = primitive_now_utc();

    let mut commit = GradingCommit::new(submission_id);
    commit.score = Some(request.new_score);
    commit.grade = Some(grade.clone());
    state.submissions().commit_grading(commit).await?;

    tracing::info!(
        submission_id,
        instructor_id,
        old_score = ?old_score,
        new_score = request.new_score,
        "Grade overridden"
    );
    state.events().emit(GradingEvent::GradeOverridden {
        submission_id: submission_id.to_string(),
        old_score,
        new_score: request.new_score,
        reason,
        instructor_id: instructor_id.to_string(),
    });

    Ok(grade)
}

/// Sends a graded submission back to the manual queue with its grade as a draft.
pub async fn return_to_queue(
    state: &AppState,
    submission_id: &str,
    performer_id: &str,
) -> GradingResult<Grade> {
    let submission = state
        .submissions()
        .find(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    if submission.state != SubmissionState::Graded {
        return Err(GradingError::State(format!(
            "only graded submissions can return to the queue, {submission_id} is {}",
            submission.state.as_str()
        )));
    }

    let mut grade = state
        .grades()
        .find_by_submission(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Grade for submission", submission_id))?;
    grade.is_draft = true;
    grade.released_at = None;
    grade.updated_at = primitive_now_utc();

    let mut commit = GradingCommit::new(submission_id);
    commit.grade = Some(grade.clone());
    commit.transition = Some(StateChange::new(GradingStep::ReturnToQueue, Some(performer_id)));
    state.submissions().commit_grading(commit).await?;

    tracing::info!(submission_id, performer_id, "Submission returned to grading queue");
    state.events().emit(GradingEvent::GradeReturnedToQueue {
        submission_id: submission_id.to_string(),
        performer_id: performer_id.to_string(),
    });

    Ok(grade)
}

pub(crate) fn emit_released(state: &AppState, submission_ids: Vec<String>, performer_id: &str) {
    if submission_ids.is_empty() {
        return;
    }
    state.events().emit(GradingEvent::GradesReleased {
        submission_ids,
        performer_id: performer_id.to_string(),
    });
}

/// Makes a finalized grade visible. Releasing twice is a no-op.
pub async fn release_grade(
    state: &AppState,
    submission_id: &str,
    performer_id: &str,
) -> GradingResult<ReleaseOutcome> {
    let outcome = release_without_event(state, submission_id, performer_id).await?;
    if outcome == ReleaseOutcome::Released {
        emit_released(state, vec![submission_id.to_string()], performer_id);
    }
    Ok(outcome)
}

/// The release itself; callers announce it, one event per batch.
pub(crate) async fn release_without_event(
    state: &AppState,
    submission_id: &str,
    performer_id: &str,
) -> GradingResult<ReleaseOutcome> {
    let submission = state
        .submissions()
        .find(submission_id)
        .await?
        .ok_or_else(|| GradingError::not_found("Submission", submission_id))?;
    if submission.state == SubmissionState::Released {
        return Ok(ReleaseOutcome::AlreadyReleased);
    }

    let mut grade = state.grades().find_by_submission(submission_id).await?.ok_or_else(|| {
        GradingError::State(format!("submission {submission_id} has no grade to release"))
    })?;
    if grade.is_draft {
        return Err(GradingError::State(format!(
            "submission {submission_id} only has a draft grade"
        )));
    }

    let now = primitive_now_utc();
    grade.released_at = Some(now);
    grade.updated_at = now;

    let mut commit = GradingCommit::new(submission_id);
    commit.grade = Some(grade);
    commit.transition = Some(StateChange::new(GradingStep::Release, Some(performer_id)));
    state.submissions().commit_grading(commit).await?;

    metrics::counter!("grades_released_total").increment(1);
    Ok(ReleaseOutcome::Released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionType;
    use crate::schemas::grading::AnswerInput;
    use crate::test_support::{self, answer, final_grade, question, TestContext};

    fn seed_essay_pair(ctx: &TestContext, state: SubmissionState) {
        ctx.seed_assignment("a1", 100.0);
        ctx.store.insert_question(question("q1", "a1", QuestionType::Essay, 1.0, 10.0));
        ctx.store.insert_question(question("q2", "a1", QuestionType::Essay, 1.0, 10.0));
        ctx.store.insert_answer(answer("s1", "q1", None));
        ctx.store.insert_answer(answer("s1", "q2", None));
        ctx.seed_submission("s1", "a1", "student", state);
    }

    fn input(entries: &[(&str, Option<f64>)]) -> AnswersByQuestion {
        entries
            .iter()
            .map(|(id, score)| (id.to_string(), AnswerInput { score: *score, feedback: None }))
            .collect()
    }

    #[tokio::test]
    async fn process_answers_rejects_out_of_bounds_scores() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::PendingManualGrading);

        let err = process_answers(&ctx.state, "s1", &input(&[("q1", Some(11.0))]))
            .await
            .expect_err("bound");
        assert!(matches!(err, GradingError::Validation(ref m) if m.contains("q1") && m.contains("10")));

        let err = process_answers(&ctx.state, "s1", &input(&[("q1", Some(-1.0))]))
            .await
            .expect_err("negative");
        assert!(matches!(err, GradingError::Validation(_)));
        assert!(ctx.store.answers("s1").iter().all(|a| a.score.is_none()));
    }

    #[tokio::test]
    async fn process_answers_stores_scores_and_clears_auto_flag() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::PendingManualGrading);

        let mut entries = input(&[("q1", Some(7.0))]);
        entries.get_mut("q1").expect("q1").feedback = Some("solid".into());
        process_answers(&ctx.state, "s1", &entries).await.expect("process");

        let stored = ctx.store.answers("s1");
        let q1 = stored.iter().find(|a| a.question_id == "q1").expect("q1");
        assert_eq!(q1.score, Some(7.0));
        assert_eq!(q1.feedback.as_deref(), Some("solid"));
        assert!(!q1.is_auto_graded);
    }

    #[tokio::test]
    async fn process_answers_rejects_unknown_question() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::PendingManualGrading);

        let err = process_answers(&ctx.state, "s1", &input(&[("q9", Some(1.0))]))
            .await
            .expect_err("unknown");
        assert!(matches!(err, GradingError::NotFound(_)));
    }

    #[tokio::test]
    async fn persist_grade_emits_created_for_named_grader() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::PendingManualGrading);
        let submission = ctx.store.submission("s1").expect("submission");

        let grade = persist_grade(&ctx.state, &submission, 72.5, Some("t-1"), None)
            .await
            .expect("persist");
        assert!(!grade.is_draft);
        assert!(grade.graded_at.is_some());
        assert_eq!(ctx.store.submission("s1").expect("s1").score, Some(72.5));
        assert!(matches!(
            ctx.events.events().as_slice(),
            [GradingEvent::GradeCreated { score: Some(score), .. }] if *score == 72.5
        ));

        persist_grade(&ctx.state, &submission, 80.0, None, None).await.expect("persist");
        assert_eq!(ctx.events.events().len(), 1);
        assert_eq!(ctx.store.grade("s1").expect("grade").id, grade.id);
    }

    #[tokio::test]
    async fn draft_accepts_partial_scores() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::PendingManualGrading);

        let request = SaveDraftRequest {
            answers: input(&[("q1", Some(8.0)), ("q2", None)]),
            feedback: Some("halfway".into()),
        };
        let grade = save_draft(&ctx.state, "s1", request, "t-1").await.expect("draft");

        assert!(grade.is_draft);
        assert_eq!(grade.score, Some(80.0));
        assert_eq!(grade.feedback.as_deref(), Some("halfway"));
        assert_eq!(ctx.store.submission("s1").expect("s1").state, SubmissionState::PendingManualGrading);
    }

    #[tokio::test]
    async fn draft_cannot_replace_finalized_grade() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::Graded);
        ctx.store.insert_grade(final_grade("s1", Some(90.0)));

        let err = save_draft(&ctx.state, "s1", SaveDraftRequest::default(), "t-1")
            .await
            .expect_err("finalized");
        assert!(matches!(err, GradingError::State(_)));
        assert!(!ctx.store.grade("s1").expect("grade").is_draft);
    }

    #[tokio::test]
    async fn override_records_reason_and_emits_old_and_new() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::Graded);
        ctx.store.insert_grade(final_grade("s1", Some(70.0)));

        let request = OverrideGradeRequest { new_score: 85.0, reason: "clerical error".into() };
        let grade = override_grade(&ctx.state, "s1", request, "t-1").await.expect("override");

        assert_eq!(grade.score, Some(85.0));
        assert_eq!(grade.override_reason.as_deref(), Some("clerical error"));
        assert_eq!(grade.overridden_by.as_deref(), Some("t-1"));
        assert_eq!(ctx.store.submission("s1").expect("s1").score, Some(85.0));
        assert_eq!(
            ctx.events.events(),
            vec![GradingEvent::GradeOverridden {
                submission_id: "s1".into(),
                old_score: Some(70.0),
                new_score: 85.0,
                reason: "clerical error".into(),
                instructor_id: "t-1".into(),
            }]
        );
    }

    #[tokio::test]
    async fn override_requires_reason_and_existing_grade() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::Graded);

        let blank = OverrideGradeRequest { new_score: 85.0, reason: "  ".into() };
        let err = override_grade(&ctx.state, "s1", blank, "t-1").await.expect_err("blank");
        assert!(matches!(err, GradingError::Validation(_)));

        let request = OverrideGradeRequest { new_score: 85.0, reason: "regrade".into() };
        let err = override_grade(&ctx.state, "s1", request, "t-1").await.expect_err("no grade");
        assert!(matches!(err, GradingError::NotFound(_)));
        assert!(ctx.events.events().is_empty());
    }

    #[tokio::test]
    async fn return_to_queue_reopens_graded_submission() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::Graded);
        ctx.store.insert_grade(final_grade("s1", Some(70.0)));

        let grade = return_to_queue(&ctx.state, "s1", "t-1").await.expect("return");

        assert!(grade.is_draft);
        let submission = ctx.store.submission("s1").expect("s1");
        assert_eq!(submission.state, SubmissionState::PendingManualGrading);
        assert_eq!(submission.state_changed_by.as_deref(), Some("t-1"));
        assert!(ctx.store.grade("s1").expect("grade").is_draft);
    }

    #[tokio::test]
    async fn return_to_queue_rejects_other_states() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::Released);
        let mut released = final_grade("s1", Some(70.0));
        released.released_at = Some(primitive_now_utc());
        ctx.store.insert_grade(released);

        let err = return_to_queue(&ctx.state, "s1", "t-1").await.expect_err("released");
        assert!(matches!(err, GradingError::State(_)));
        assert!(!ctx.store.grade("s1").expect("grade").is_draft);
    }

    #[tokio::test]
    async fn release_requires_final_grade_and_is_idempotent() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::Graded);
        let mut draft = final_grade("s1", Some(70.0));
        draft.is_draft = true;
        ctx.store.insert_grade(draft);

        let err = release_grade(&ctx.state, "s1", "t-1").await.expect_err("draft");
        assert!(matches!(err, GradingError::State(_)));
        assert_eq!(ctx.store.submission("s1").expect("s1").state, SubmissionState::Graded);

        ctx.store.insert_grade(final_grade("s1", Some(70.0)));
        assert_eq!(
            release_grade(&ctx.state, "s1", "t-1").await.expect("release"),
            ReleaseOutcome::Released
        );
        assert!(ctx.store.grade("s1").expect("grade").is_visible());
        assert_eq!(
            release_grade(&ctx.state, "s1", "t-1").await.expect("again"),
            ReleaseOutcome::AlreadyReleased
        );
        assert_eq!(ctx.events.events().len(), 1);
    }

    #[tokio::test]
    async fn release_rejects_ungraded_submission() {
        let ctx = test_support::setup();
        seed_essay_pair(&ctx, SubmissionState::PendingManualGrading);
        ctx.store.insert_grade(final_grade("s1", Some(70.0)));

        let err = release_grade(&ctx.state, "s1", "t-1").await.expect_err("pending");
        assert!(matches!(err, GradingError::State(_)));
        assert!(ctx.store.grade("s1").expect("grade").released_at.is_none());
    }
}
