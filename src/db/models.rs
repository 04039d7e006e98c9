use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AppealStatus, QuestionType, SubmissionState};

/// Grades are stored on a percentage scale.
pub const GRADE_MAX_SCORE: f64 = 100.0;

pub const GRADE_SOURCE_ASSIGNMENT: &str = "assignment";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub created_by: String,
    pub max_score: f64,
    pub deadline_at: Option<PrimitiveDateTime>,
    pub tolerance_window_minutes: Option<i32>,
    pub late_penalty_percent: Option<f64>,
    pub question_set: Option<Json<Vec<String>>>,
    pub created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: String,
    pub assignment_id: String,
    pub question_type: QuestionType,
    pub weight: f64,
    pub max_score: f64,
    pub answer_key: Json<serde_json::Value>,
    pub order_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub user_id: String,
    pub state: SubmissionState,
    pub score: Option<f64>,
    pub is_late: bool,
    pub attempt_number: i32,
    pub submitted_at: PrimitiveDateTime,
    pub state_changed_by: Option<String>,
    pub updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: String,
    pub submission_id: String,
    pub question_id: String,
    pub response: Json<serde_json::Value>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub is_auto_graded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionWithAnswers {
    pub submission: Submission,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Grade {
    pub id: String,
    pub submission_id: String,
    pub source_type: String,
    pub source_id: String,
    pub score: Option<f64>,
    pub max_score: f64,
    pub is_draft: bool,
    pub feedback: Option<String>,
    pub graded_by: Option<String>,
    pub graded_at: Option<PrimitiveDateTime>,
    pub released_at: Option<PrimitiveDateTime>,
    pub override_reason: Option<String>,
    pub overridden_by: Option<String>,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

impl Grade {
    pub fn is_visible(&self) -> bool {
        !self.is_draft && self.released_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub path: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Appeal {
    pub id: String,
    pub submission_id: String,
    pub student_id: String,
    pub reason: String,
    pub status: AppealStatus,
    pub supporting_documents: Json<Vec<StoredDocument>>,
    pub reviewer_id: Option<String>,
    pub decision_reason: Option<String>,
    pub decided_at: Option<PrimitiveDateTime>,
    pub created_at: PrimitiveDateTime,
}
