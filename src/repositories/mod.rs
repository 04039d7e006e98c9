//! Collaborator-facing stores the grading core reads and writes through.
//!
//! `PgStore` backs every trait with Postgres; `MemoryStore` keeps the same
//! contracts in process for tests and embedding.

pub mod appeals;
pub mod assignments;
pub mod grades;
pub mod memory;
pub mod pg_store;
pub mod submissions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::{
    Appeal, Assignment, Grade, Question, Submission, SubmissionWithAnswers,
};
use crate::db::types::{AppealStatus, SubmissionState};
use crate::errors::GradingResult;
use crate::schemas::grading::QueueFilter;
use crate::services::state_machine::GradingStep;

pub use memory::MemoryStore;
pub use pg_store::PgStore;

/// Score and feedback written back onto one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerUpdate {
    pub question_id: String,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub is_auto_graded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub step: GradingStep,
    pub actor_id: Option<String>,
}

impl StateChange {
    pub fn new(step: GradingStep, actor_id: Option<&str>) -> Self {
        Self { step, actor_id: actor_id.map(str::to_string) }
    }
}

/// Writes that must land together for one submission.
///
/// Stores apply the answers, score, grade and transition inside a single
/// transaction. The transition only moves a submission whose current state
/// is one of the step's sources; otherwise nothing is written.
#[derive(Debug, Clone, Default)]
pub struct GradingCommit {
    pub submission_id: String,
    pub answers: Vec<AnswerUpdate>,
    pub score: Option<f64>,
    pub grade: Option<Grade>,
    pub transition: Option<StateChange>,
}

impl GradingCommit {
    pub fn new(submission_id: &str) -> Self {
        Self { submission_id: submission_id.to_string(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QueuedSubmission {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub submission: Submission,
    pub pending_answers: i64,
}

#[derive(Debug, Clone)]
pub struct AppealDecision {
    pub appeal_id: String,
    pub status: AppealStatus,
    pub reviewer_id: String,
    pub decision_reason: Option<String>,
    pub decided_at: PrimitiveDateTime,
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn find(&self, id: &str) -> GradingResult<Option<Submission>>;

    async fn find_with_answers(&self, id: &str) -> GradingResult<Option<SubmissionWithAnswers>>;

    async fn update_score(&self, id: &str, score: Option<f64>) -> GradingResult<()>;

    async fn set_late(&self, id: &str, is_late: bool) -> GradingResult<()>;

    /// Fails with `GradingError::State` when the current state cannot move to `state`.
    async fn transition_to(
        &self,
        id: &str,
        state: SubmissionState,
        actor_id: Option<&str>,
    ) -> GradingResult<()>;

    async fn update_answers(&self, submission_id: &str, updates: &[AnswerUpdate])
        -> GradingResult<()>;

    async fn commit_grading(&self, commit: GradingCommit) -> GradingResult<()>;

    /// Submissions awaiting a human, oldest first, with the total match count.
    async fn list_pending_manual(
        &self,
        filter: &QueueFilter,
        skip: i64,
        limit: i64,
    ) -> GradingResult<(Vec<QueuedSubmission>, i64)>;

    async fn list_for_student(
        &self,
        student_id: &str,
        assignment_ids: &[String],
    ) -> GradingResult<Vec<Submission>>;
}

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn upsert_by_submission(&self, grade: &Grade) -> GradingResult<Grade>;

    async fn find_by_submission(&self, submission_id: &str) -> GradingResult<Option<Grade>>;

    async fn find_by_submissions(&self, submission_ids: &[String]) -> GradingResult<Vec<Grade>>;

    /// Returns false when the submission has no grade.
    async fn update_feedback(&self, submission_id: &str, feedback: &str) -> GradingResult<bool>;
}

#[async_trait]
pub trait AppealRepository: Send + Sync {
    async fn create(&self, appeal: &Appeal) -> GradingResult<Appeal>;

    async fn find_by_submission(&self, submission_id: &str) -> GradingResult<Option<Appeal>>;

    async fn find_by_id(&self, id: &str) -> GradingResult<Option<Appeal>>;

    async fn find_pending_for_instructor(&self, instructor_id: &str) -> GradingResult<Vec<Appeal>>;

    /// Records a decision on a pending appeal. Approval also clears the
    /// submission's lateness flag in the same transaction.
    async fn decide(&self, decision: AppealDecision) -> GradingResult<Appeal>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn find(&self, id: &str) -> GradingResult<Option<Assignment>>;

    async fn questions(&self, assignment_id: &str) -> GradingResult<Vec<Question>>;

    async fn list_by_course(&self, course_id: &str) -> GradingResult<Vec<Assignment>>;
}
