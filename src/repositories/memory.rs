use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::time::primitive_now_utc;
use crate::db::models::{
    Answer, Appeal, Assignment, Grade, Question, Submission, SubmissionWithAnswers,
};
use crate::db::types::{AppealStatus, QuestionType, SubmissionState};
use crate::errors::{GradingError, GradingResult};
use crate::schemas::grading::QueueFilter;
use crate::services::state_machine;

use super::{
    AnswerUpdate, AppealDecision, AppealRepository, AssignmentRepository, GradeRepository,
    GradingCommit, QueuedSubmission, SubmissionRepository,
};

#[derive(Default)]
struct Tables {
    assignments: HashMap<String, Assignment>,
    questions: Vec<Question>,
    submissions: HashMap<String, Submission>,
    answers: Vec<Answer>,
    grades: HashMap<String, Grade>,
    appeals: HashMap<String, Appeal>,
}

impl Tables {
    fn answer_mut(&mut self, submission_id: &str, question_id: &str) -> Option<&mut Answer> {
        self.answers
            .iter_mut()
            .find(|answer| answer.submission_id == submission_id && answer.question_id == question_id)
    }

    fn has_answer(&self, submission_id: &str, question_id: &str) -> bool {
        self.answers
            .iter()
            .any(|answer| answer.submission_id == submission_id && answer.question_id == question_id)
    }

    fn question_type(&self, question_id: &str) -> Option<QuestionType> {
        self.questions
            .iter()
            .find(|question| question.id == question_id)
            .map(|question| question.question_type)
    }

    fn pending_manual_answers(&self, submission_id: &str) -> i64 {
        self.answers
            .iter()
            .filter(|answer| answer.submission_id == submission_id && answer.score.is_none())
            .filter(|answer| {
                matches!(
                    self.question_type(&answer.question_id),
                    Some(QuestionType::Essay | QuestionType::FileUpload)
                )
            })
            .count() as i64
    }

    fn apply_answer(&mut self, submission_id: &str, update: &AnswerUpdate) -> bool {
        let Some(answer) = self.answer_mut(submission_id, &update.question_id) else {
            return false;
        };
        answer.score = update.score;
        answer.feedback = update.feedback.clone();
        answer.is_auto_graded = update.is_auto_graded;
        true
    }

    fn move_submission(
        &mut self,
        id: &str,
        to: SubmissionState,
        sources: &[SubmissionState],
        actor_id: Option<&str>,
    ) -> GradingResult<()> {
        let submission =
            self.submissions.get_mut(id).ok_or_else(|| GradingError::not_found("Submission", id))?;
        if !sources.contains(&submission.state) {
            return Err(GradingError::State(format!(
                "cannot move submission from {} to {}",
                submission.state.as_str(),
                to.as_str()
            )));
        }
        submission.state = to;
        submission.state_changed_by = actor_id.map(str::to_string);
        submission.updated_at = primitive_now_utc();
        Ok(())
    }
}

/// In-process store with the same contracts as [`super::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_assignment(&self, assignment: Assignment) {
        self.lock().assignments.insert(assignment.id.clone(), assignment);
    }

    pub fn insert_question(&self, question: Question) {
        self.lock().questions.push(question);
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.lock().submissions.insert(submission.id.clone(), submission);
    }

    pub fn insert_answer(&self, answer: Answer) {
        self.lock().answers.push(answer);
    }

    pub fn insert_grade(&self, grade: Grade) {
        self.lock().grades.insert(grade.submission_id.clone(), grade);
    }

    pub fn submission(&self, id: &str) -> Option<Submission> {
        self.lock().submissions.get(id).cloned()
    }

    pub fn answers(&self, submission_id: &str) -> Vec<Answer> {
        self.lock()
            .answers
            .iter()
            .filter(|answer| answer.submission_id == submission_id)
            .cloned()
            .collect()
    }

    pub fn grade(&self, submission_id: &str) -> Option<Grade> {
        self.lock().grades.get(submission_id).cloned()
    }

    pub fn appeal_count(&self) -> usize {
        self.lock().appeals.len()
    }
}

#[async_trait]
impl SubmissionRepository for MemoryStore {
    async fn find(&self, id: &str) -> GradingResult<Option<Submission>> {
        Ok(self.submission(id))
    }

    async fn find_with_answers(&self, id: &str) -> GradingResult<Option<SubmissionWithAnswers>> {
        let tables = self.lock();
        let Some(submission) = tables.submissions.get(id).cloned() else {
            return Ok(None);
        };

        let order: HashMap<&str, i32> = tables
            .questions
            .iter()
            .map(|question| (question.id.as_str(), question.order_index))
            .collect();
        let mut answers: Vec<Answer> =
            tables.answers.iter().filter(|answer| answer.submission_id == id).cloned().collect();
        answers.sort_by_key(|answer| {
            (order.get(answer.question_id.as_str()).copied().unwrap_or(i32::MAX), answer.id.clone())
        });

        Ok(Some(SubmissionWithAnswers { submission, answers }))
    }

    async fn update_score(&self, id: &str, score: Option<f64>) -> GradingResult<()> {
        let mut tables = self.lock();
        let submission =
            tables.submissions.get_mut(id).ok_or_else(|| GradingError::not_found("Submission", id))?;
        submission.score = score;
        submission.updated_at = primitive_now_utc();
        Ok(())
    }

    async fn set_late(&self, id: &str, is_late: bool) -> GradingResult<()> {
        let mut tables = self.lock();
        let submission =
            tables.submissions.get_mut(id).ok_or_else(|| GradingError::not_found("Submission", id))?;
        submission.is_late = is_late;
        submission.updated_at = primitive_now_utc();
        Ok(())
    }

    async fn transition_to(
        &self,
        id: &str,
        state: SubmissionState,
        actor_id: Option<&str>,
    ) -> GradingResult<()> {
        self.lock().move_submission(id, state, state_machine::legal_sources(state), actor_id)
    }

    async fn update_answers(
        &self,
        submission_id: &str,
        updates: &[AnswerUpdate],
    ) -> GradingResult<()> {
        let mut tables = self.lock();
        if let Some(missing) =
            updates.iter().find(|update| !tables.has_answer(submission_id, &update.question_id))
        {
            return Err(GradingError::not_found("Answer for question", &missing.question_id));
        }
        for update in updates {
            tables.apply_answer(submission_id, update);
        }
        Ok(())
    }

    async fn commit_grading(&self, commit: GradingCommit) -> GradingResult<()> {
        let mut tables = self.lock();
        let id = commit.submission_id.as_str();

        // Check everything before the first write so a rejected commit leaves no trace.
        let current = tables
            .submissions
            .get(id)
            .map(|submission| submission.state)
            .ok_or_else(|| GradingError::not_found("Submission", id))?;
        if let Some(missing) =
            commit.answers.iter().find(|update| !tables.has_answer(id, &update.question_id))
        {
            return Err(GradingError::not_found("Answer for question", &missing.question_id));
        }
        if let Some(change) = &commit.transition {
            change.step.ensure_from(current)?;
        }

        for update in &commit.answers {
            tables.apply_answer(id, update);
        }
        if let Some(submission) = tables.submissions.get_mut(id) {
            if let Some(score) = commit.score {
                submission.score = Some(score);
            }
            submission.updated_at = primitive_now_utc();
        }
        if let Some(grade) = commit.grade {
            tables.grades.insert(grade.submission_id.clone(), grade);
        }
        if let Some(change) = &commit.transition {
            let step = change.step;
            tables.move_submission(id, step.target(), step.sources(), change.actor_id.as_deref())?;
        }

        Ok(())
    }

    async fn list_pending_manual(
        &self,
        filter: &QueueFilter,
        skip: i64,
        limit: i64,
    ) -> GradingResult<(Vec<QueuedSubmission>, i64)> {
        let tables = self.lock();
        let search = filter.search_term().map(str::to_lowercase);

        let mut matches: Vec<QueuedSubmission> = tables
            .submissions
            .values()
            .filter(|s| s.state == SubmissionState::PendingManualGrading)
            .filter(|s| filter.assignment_id.as_deref().map_or(true, |id| s.assignment_id == id))
            .filter(|s| filter.user_id.as_deref().map_or(true, |id| s.user_id == id))
            .filter(|s| filter.is_late.map_or(true, |late| s.is_late == late))
            .filter(|s| filter.submitted_from.map_or(true, |from| s.submitted_at >= from))
            .filter(|s| filter.submitted_to.map_or(true, |to| s.submitted_at <= to))
            .filter(|s| {
                let Some(term) = search.as_deref() else {
                    return true;
                };
                let title = tables
                    .assignments
                    .get(&s.assignment_id)
                    .map(|assignment| assignment.title.to_lowercase())
                    .unwrap_or_default();
                s.id.to_lowercase().contains(term)
                    || s.user_id.to_lowercase().contains(term)
                    || title.contains(term)
            })
            .filter_map(|s| {
                let pending_answers = tables.pending_manual_answers(&s.id);
                (pending_answers > 0)
                    .then(|| QueuedSubmission { submission: s.clone(), pending_answers })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.submission
                .submitted_at
                .cmp(&b.submission.submitted_at)
                .then_with(|| a.submission.id.cmp(&b.submission.id))
        });

        let total_count = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total_count))
    }

    async fn list_for_student(
        &self,
        student_id: &str,
        assignment_ids: &[String],
    ) -> GradingResult<Vec<Submission>> {
        let tables = self.lock();
        let mut submissions: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.user_id == student_id && assignment_ids.contains(&s.assignment_id))
            .cloned()
            .collect();
        submissions.sort_by(|a, b| {
            a.assignment_id.cmp(&b.assignment_id).then(a.attempt_number.cmp(&b.attempt_number))
        });
        Ok(submissions)
    }
}

#[async_trait]
impl GradeRepository for MemoryStore {
    async fn upsert_by_submission(&self, grade: &Grade) -> GradingResult<Grade> {
        self.lock().grades.insert(grade.submission_id.clone(), grade.clone());
        Ok(grade.clone())
    }

    async fn find_by_submission(&self, submission_id: &str) -> GradingResult<Option<Grade>> {
        Ok(self.grade(submission_id))
    }

    async fn find_by_submissions(&self, submission_ids: &[String]) -> GradingResult<Vec<Grade>> {
        let tables = self.lock();
        Ok(submission_ids.iter().filter_map(|id| tables.grades.get(id).cloned()).collect())
    }

    async fn update_feedback(&self, submission_id: &str, feedback: &str) -> GradingResult<bool> {
        let mut tables = self.lock();
        let Some(grade) = tables.grades.get_mut(submission_id) else {
            return Ok(false);
        };
        grade.feedback = Some(feedback.to_string());
        grade.updated_at = primitive_now_utc();
        Ok(true)
    }
}

#[async_trait]
impl AppealRepository for MemoryStore {
    async fn create(&self, appeal: &Appeal) -> GradingResult<Appeal> {
        let mut tables = self.lock();
        if tables.appeals.values().any(|existing| existing.submission_id == appeal.submission_id) {
            return Err(GradingError::Eligibility(format!(
                "an appeal already exists for submission {}",
                appeal.submission_id
            )));
        }
        tables.appeals.insert(appeal.id.clone(), appeal.clone());
        Ok(appeal.clone())
    }

    async fn find_by_submission(&self, submission_id: &str) -> GradingResult<Option<Appeal>> {
        Ok(self
            .lock()
            .appeals
            .values()
            .find(|appeal| appeal.submission_id == submission_id)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> GradingResult<Option<Appeal>> {
        Ok(self.lock().appeals.get(id).cloned())
    }

    async fn find_pending_for_instructor(&self, instructor_id: &str) -> GradingResult<Vec<Appeal>> {
        let tables = self.lock();
        let mut pending: Vec<Appeal> = tables
            .appeals
            .values()
            .filter(|appeal| appeal.status == AppealStatus::Pending)
            .filter(|appeal| {
                tables
                    .submissions
                    .get(&appeal.submission_id)
                    .and_then(|submission| tables.assignments.get(&submission.assignment_id))
                    .is_some_and(|assignment| assignment.created_by == instructor_id)
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn decide(&self, decision: AppealDecision) -> GradingResult<Appeal> {
        let mut tables = self.lock();
        let appeal = tables
            .appeals
            .get_mut(&decision.appeal_id)
            .filter(|appeal| appeal.status == AppealStatus::Pending)
            .ok_or_else(|| {
                GradingError::State(format!(
                    "appeal {} has already been decided",
                    decision.appeal_id
                ))
            })?;

        appeal.status = decision.status;
        appeal.reviewer_id = Some(decision.reviewer_id.clone());
        appeal.decision_reason = decision.decision_reason.clone();
        appeal.decided_at = Some(decision.decided_at);
        let appeal = appeal.clone();

        if decision.status == AppealStatus::Approved {
            if let Some(submission) = tables.submissions.get_mut(&appeal.submission_id) {
                submission.is_late = false;
                submission.updated_at = decision.decided_at;
            }
        }

        Ok(appeal)
    }
}

#[async_trait]
impl AssignmentRepository for MemoryStore {
    async fn find(&self, id: &str) -> GradingResult<Option<Assignment>> {
        Ok(self.lock().assignments.get(id).cloned())
    }

    async fn questions(&self, assignment_id: &str) -> GradingResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .lock()
            .questions
            .iter()
            .filter(|question| question.assignment_id == assignment_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn list_by_course(&self, course_id: &str) -> GradingResult<Vec<Assignment>> {
        let mut assignments: Vec<Assignment> = self
            .lock()
            .assignments
            .values()
            .filter(|assignment| assignment.course_id == course_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(assignments)
    }
}
