use std::sync::Arc;

use serde_json::Value;
use sqlx::types::Json;
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::core::config::GradingSettings;
use crate::core::state::{AppState, Stores};
use crate::db::models::{
    Answer, Assignment, Grade, Question, Submission, GRADE_MAX_SCORE, GRADE_SOURCE_ASSIGNMENT,
};
use crate::db::types::{QuestionType, SubmissionState};
use crate::repositories::MemoryStore;
use crate::services::events::RecordingEventSink;
use crate::services::storage::{FileStorage, MemoryFileStorage};
use crate::tasks::jobs::RecordingJobQueue;

pub(crate) const COURSE_ID: &str = "c1";
pub(crate) const INSTRUCTOR_ID: &str = "instructor";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) events: RecordingEventSink,
    pub(crate) jobs: RecordingJobQueue,
    pub(crate) files: MemoryFileStorage,
}

impl TestContext {
    pub(crate) fn seed_assignment(&self, id: &str, max_score: f64) {
        self.store.insert_assignment(assignment(id, max_score));
    }

    pub(crate) fn seed_submission(
        &self,
        id: &str,
        assignment_id: &str,
        user_id: &str,
        state: SubmissionState,
    ) {
        self.store.insert_submission(submission(id, assignment_id, user_id, state));
    }
}

pub(crate) fn setup() -> TestContext {
    build(GradingSettings::default(), MemoryFileStorage::new(), |_, _| {})
}

pub(crate) fn setup_with_settings(settings: GradingSettings) -> TestContext {
    build(settings, MemoryFileStorage::new(), |_, _| {})
}

pub(crate) fn setup_with_files(files: MemoryFileStorage) -> TestContext {
    build(GradingSettings::default(), files, |_, _| {})
}

/// Lets a test swap individual stores, e.g. to inject failures.
pub(crate) fn setup_with_stores(
    files: MemoryFileStorage,
    customize: impl FnOnce(&mut Stores, Arc<MemoryStore>),
) -> TestContext {
    build(GradingSettings::default(), files, customize)
}

fn build(
    settings: GradingSettings,
    files: MemoryFileStorage,
    customize: impl FnOnce(&mut Stores, Arc<MemoryStore>),
) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let events = RecordingEventSink::new();
    let jobs = RecordingJobQueue::new();

    let mut stores = Stores::from_backend(store.clone());
    customize(&mut stores, store.clone());

    let state = AppState::new(
        settings,
        stores,
        Some(Arc::new(files.clone()) as Arc<dyn FileStorage>),
        Arc::new(events.clone()),
        Arc::new(jobs.clone()),
    );

    TestContext { state, store, events, jobs, files }
}

pub(crate) fn base_time() -> PrimitiveDateTime {
    let date = Date::from_calendar_date(2026, Month::March, 2).expect("date");
    PrimitiveDateTime::new(date, Time::from_hms(9, 0, 0).expect("time"))
}

pub(crate) fn assignment(id: &str, max_score: f64) -> Assignment {
    Assignment {
        id: id.to_string(),
        course_id: COURSE_ID.to_string(),
        title: format!("Assignment {id}"),
        created_by: INSTRUCTOR_ID.to_string(),
        max_score,
        deadline_at: None,
        tolerance_window_minutes: None,
        late_penalty_percent: None,
        question_set: None,
        created_at: base_time(),
    }
}

pub(crate) fn question(
    id: &str,
    assignment_id: &str,
    question_type: QuestionType,
    weight: f64,
    max_score: f64,
) -> Question {
    Question {
        id: id.to_string(),
        assignment_id: assignment_id.to_string(),
        question_type,
        weight,
        max_score,
        answer_key: Json(Value::Null),
        order_index: 0,
    }
}

pub(crate) fn question_with_key(
    id: &str,
    question_type: QuestionType,
    max_score: f64,
    key: Value,
) -> Question {
    Question { answer_key: Json(key), ..question(id, "a1", question_type, 1.0, max_score) }
}

pub(crate) fn submission(
    id: &str,
    assignment_id: &str,
    user_id: &str,
    state: SubmissionState,
) -> Submission {
    Submission {
        id: id.to_string(),
        assignment_id: assignment_id.to_string(),
        user_id: user_id.to_string(),
        state,
        score: None,
        is_late: false,
        attempt_number: 1,
        submitted_at: base_time(),
        state_changed_by: None,
        updated_at: base_time(),
    }
}

pub(crate) fn answer(submission_id: &str, question_id: &str, score: Option<f64>) -> Answer {
    Answer {
        id: format!("{submission_id}-{question_id}"),
        submission_id: submission_id.to_string(),
        question_id: question_id.to_string(),
        response: Json(Value::Null),
        score,
        feedback: None,
        is_auto_graded: false,
    }
}

pub(crate) fn answer_with_response(submission_id: &str, question_id: &str, response: Value) -> Answer {
    Answer { response: Json(response), ..answer(submission_id, question_id, None) }
}

/// A finalized, unreleased grade.
pub(crate) fn final_grade(submission_id: &str, score: Option<f64>) -> Grade {
    Grade {
        id: format!("g-{submission_id}"),
        submission_id: submission_id.to_string(),
        source_type: GRADE_SOURCE_ASSIGNMENT.to_string(),
        source_id: "a1".to_string(),
        score,
        max_score: GRADE_MAX_SCORE,
        is_draft: false,
        feedback: None,
        graded_by: Some(INSTRUCTOR_ID.to_string()),
        graded_at: Some(base_time()),
        released_at: None,
        override_reason: None,
        overridden_by: None,
        created_at: base_time(),
        updated_at: base_time(),
    }
}
