use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use validator::{Validate, ValidationError};

use crate::db::types::SubmissionState;

/// Score and feedback a grader enters for one question.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AnswerInput {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl AnswerInput {
    pub fn scored(score: f64) -> Self {
        Self { score: Some(score), feedback: None }
    }
}

pub type AnswersByQuestion = BTreeMap<String, AnswerInput>;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ManualGradeRequest {
    #[serde(default)]
    pub answers: AnswersByQuestion,
    #[validate(range(min = 0.0, max = 100.0, message = "score_override must be within 0..=100"))]
    #[serde(default)]
    pub score_override: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SaveDraftRequest {
    #[serde(default)]
    pub answers: AnswersByQuestion,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OverrideGradeRequest {
    #[validate(range(min = 0.0, max = 100.0, message = "new_score must be within 0..=100"))]
    pub new_score: f64,
    #[validate(custom(function = "not_blank", message = "an override reason is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkReleaseRequest {
    #[validate(length(min = 1, message = "at least one submission id is required"))]
    pub submission_ids: Vec<String>,
    #[serde(default)]
    pub run_async: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkFeedbackRequest {
    #[validate(length(min = 1, message = "at least one submission id is required"))]
    pub submission_ids: Vec<String>,
    #[validate(custom(function = "not_blank", message = "feedback text is required"))]
    pub feedback: String,
    #[serde(default)]
    pub run_async: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct QueueFilter {
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_late: Option<bool>,
    #[serde(default)]
    pub submitted_from: Option<PrimitiveDateTime>,
    #[serde(default)]
    pub submitted_to: Option<PrimitiveDateTime>,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub search: Option<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub skip: Option<i64>,
    #[validate(range(min = 1, max = 500))]
    #[serde(default)]
    pub limit: Option<i64>,
}

impl QueueFilter {
    /// Search term trimmed, or `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|term| !term.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingStatusDetails {
    pub submission_id: String,
    pub state: SubmissionState,
    pub graded_count: usize,
    pub total_count: usize,
    pub is_complete: bool,
    pub can_release: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released,
    AlreadyReleased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub submission_id: String,
    pub error: String,
}

/// Per-item results of a bulk run that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    /// Confirmed successes only.
    pub fn count(&self) -> usize {
        self.succeeded.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkOutcome {
    Queued { submission_count: usize },
    Completed(BulkReport),
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
