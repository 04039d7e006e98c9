use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::{
    Appeal, Assignment, Grade, Question, Submission, SubmissionWithAnswers,
};
use crate::db::types::{AppealStatus, SubmissionState};
use crate::errors::{GradingError, GradingResult};
use crate::schemas::grading::QueueFilter;
use crate::services::state_machine;

use super::{
    appeals, assignments, grades, submissions, AnswerUpdate, AppealDecision, AppealRepository,
    AssignmentRepository, GradeRepository, GradingCommit, QueuedSubmission, SubmissionRepository,
};

/// Postgres-backed implementation of every grading store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn illegal_transition(id: &str, to: SubmissionState) -> GradingError {
    GradingError::State(format!(
        "submission {id} cannot move to {} from its current state",
        to.as_str()
    ))
}

#[async_trait]
impl SubmissionRepository for PgStore {
    async fn find(&self, id: &str) -> GradingResult<Option<Submission>> {
        submissions::find_by_id(&self.pool, id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch submission"))
    }

    async fn find_with_answers(&self, id: &str) -> GradingResult<Option<SubmissionWithAnswers>> {
        let Some(submission) = SubmissionRepository::find(self, id).await? else {
            return Ok(None);
        };
        let answers = submissions::list_answers(&self.pool, id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch answers"))?;

        Ok(Some(SubmissionWithAnswers { submission, answers }))
    }

    async fn update_score(&self, id: &str, score: Option<f64>) -> GradingResult<()> {
        let updated = submissions::update_score(&self.pool, id, score, primitive_now_utc())
            .await
            .map_err(|e| GradingError::internal(e, "Failed to update submission score"))?;
        if !updated {
            return Err(GradingError::not_found("Submission", id));
        }
        Ok(())
    }

    async fn set_late(&self, id: &str, is_late: bool) -> GradingResult<()> {
        let updated = submissions::set_late(&self.pool, id, is_late, primitive_now_utc())
            .await
            .map_err(|e| GradingError::internal(e, "Failed to update lateness flag"))?;
        if !updated {
            return Err(GradingError::not_found("Submission", id));
        }
        Ok(())
    }

    async fn transition_to(
        &self,
        id: &str,
        state: SubmissionState,
        actor_id: Option<&str>,
    ) -> GradingResult<()> {
        let moved = submissions::transition(
            &self.pool,
            id,
            state,
            state_machine::legal_sources(state),
            actor_id,
            primitive_now_utc(),
        )
        .await
        .map_err(|e| GradingError::internal(e, "Failed to transition submission"))?;
        if !moved {
            return Err(illegal_transition(id, state));
        }
        Ok(())
    }

    async fn update_answers(
        &self,
        submission_id: &str,
        updates: &[AnswerUpdate],
    ) -> GradingResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GradingError::internal(e, "Failed to open transaction"))?;

        for update in updates {
            let updated = submissions::update_answer(&mut *tx, submission_id, update)
                .await
                .map_err(|e| GradingError::internal(e, "Failed to update answer"))?;
            if !updated {
                return Err(GradingError::not_found("Answer for question", &update.question_id));
            }
        }

        tx.commit().await.map_err(|e| GradingError::internal(e, "Failed to commit answers"))
    }

    async fn commit_grading(&self, commit: GradingCommit) -> GradingResult<()> {
        let now = primitive_now_utc();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GradingError::internal(e, "Failed to open transaction"))?;

        for update in &commit.answers {
            let updated = submissions::update_answer(&mut *tx, &commit.submission_id, update)
                .await
                .map_err(|e| GradingError::internal(e, "Failed to update answer"))?;
            if !updated {
                return Err(GradingError::not_found("Answer for question", &update.question_id));
            }
        }

        if let Some(score) = commit.score {
            submissions::update_score(&mut *tx, &commit.submission_id, Some(score), now)
                .await
                .map_err(|e| GradingError::internal(e, "Failed to update submission score"))?;
        }

        if let Some(grade) = &commit.grade {
            grades::upsert(&mut *tx, grade)
                .await
                .map_err(|e| GradingError::internal(e, "Failed to upsert grade"))?;
        }

        if let Some(change) = &commit.transition {
            let moved = submissions::transition(
                &mut *tx,
                &commit.submission_id,
                change.step.target(),
                change.step.sources(),
                change.actor_id.as_deref(),
                now,
            )
            .await
            .map_err(|e| GradingError::internal(e, "Failed to transition submission"))?;
            if !moved {
                return Err(illegal_transition(&commit.submission_id, change.step.target()));
            }
        }

        tx.commit().await.map_err(|e| GradingError::internal(e, "Failed to commit grading"))
    }

    async fn list_pending_manual(
        &self,
        filter: &QueueFilter,
        skip: i64,
        limit: i64,
    ) -> GradingResult<(Vec<QueuedSubmission>, i64)> {
        submissions::list_pending_manual(&self.pool, filter, skip, limit)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to list grading queue"))
    }

    async fn list_for_student(
        &self,
        student_id: &str,
        assignment_ids: &[String],
    ) -> GradingResult<Vec<Submission>> {
        submissions::list_for_student(&self.pool, student_id, assignment_ids)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to list student submissions"))
    }
}

#[async_trait]
impl GradeRepository for PgStore {
    async fn upsert_by_submission(&self, grade: &Grade) -> GradingResult<Grade> {
        grades::upsert(&self.pool, grade)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to upsert grade"))
    }

    async fn find_by_submission(&self, submission_id: &str) -> GradingResult<Option<Grade>> {
        grades::find_by_submission(&self.pool, submission_id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch grade"))
    }

    async fn find_by_submissions(&self, submission_ids: &[String]) -> GradingResult<Vec<Grade>> {
        grades::list_by_submissions(&self.pool, submission_ids)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch grades"))
    }

    async fn update_feedback(&self, submission_id: &str, feedback: &str) -> GradingResult<bool> {
        grades::update_feedback(&self.pool, submission_id, feedback, primitive_now_utc())
            .await
            .map_err(|e| GradingError::internal(e, "Failed to update grade feedback"))
    }
}

#[async_trait]
impl AppealRepository for PgStore {
    async fn create(&self, appeal: &Appeal) -> GradingResult<Appeal> {
        appeals::insert(&self.pool, appeal).await.map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => GradingError::Eligibility(format!(
                "an appeal already exists for submission {}",
                appeal.submission_id
            )),
            _ => GradingError::internal(e, "Failed to create appeal"),
        })
    }

    async fn find_by_submission(&self, submission_id: &str) -> GradingResult<Option<Appeal>> {
        appeals::find_by_submission(&self.pool, submission_id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch appeal"))
    }

    async fn find_by_id(&self, id: &str) -> GradingResult<Option<Appeal>> {
        appeals::find_by_id(&self.pool, id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch appeal"))
    }

    async fn find_pending_for_instructor(&self, instructor_id: &str) -> GradingResult<Vec<Appeal>> {
        appeals::list_pending_for_instructor(&self.pool, instructor_id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to list pending appeals"))
    }

    async fn decide(&self, decision: AppealDecision) -> GradingResult<Appeal> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GradingError::internal(e, "Failed to open transaction"))?;

        let Some(appeal) = appeals::decide(&mut *tx, &decision)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to record appeal decision"))?
        else {
            return Err(GradingError::State(format!(
                "appeal {} has already been decided",
                decision.appeal_id
            )));
        };

        if decision.status == AppealStatus::Approved {
            submissions::set_late(&mut *tx, &appeal.submission_id, false, decision.decided_at)
                .await
                .map_err(|e| GradingError::internal(e, "Failed to clear lateness flag"))?;
        }

        tx.commit()
            .await
            .map_err(|e| GradingError::internal(e, "Failed to commit appeal decision"))?;

        Ok(appeal)
    }
}

#[async_trait]
impl AssignmentRepository for PgStore {
    async fn find(&self, id: &str) -> GradingResult<Option<Assignment>> {
        assignments::find_by_id(&self.pool, id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch assignment"))
    }

    async fn questions(&self, assignment_id: &str) -> GradingResult<Vec<Question>> {
        assignments::list_questions(&self.pool, assignment_id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to fetch questions"))
    }

    async fn list_by_course(&self, course_id: &str) -> GradingResult<Vec<Assignment>> {
        assignments::list_by_course(&self.pool, course_id)
            .await
            .map_err(|e| GradingError::internal(e, "Failed to list course assignments"))
    }
}
