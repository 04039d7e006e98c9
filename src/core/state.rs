use std::sync::Arc;

use crate::core::config::GradingSettings;
use crate::repositories::{
    AppealRepository, AssignmentRepository, GradeRepository, SubmissionRepository,
};
use crate::services::events::EventSink;
use crate::services::storage::FileStorage;
use crate::tasks::jobs::JobQueue;

/// A single backend that provides every store the grading core needs.
pub trait GradingStore:
    SubmissionRepository + GradeRepository + AppealRepository + AssignmentRepository + 'static
{
}

impl<T> GradingStore for T where
    T: SubmissionRepository + GradeRepository + AppealRepository + AssignmentRepository + 'static
{
}

#[derive(Clone)]
pub struct Stores {
    pub submissions: Arc<dyn SubmissionRepository>,
    pub grades: Arc<dyn GradeRepository>,
    pub appeals: Arc<dyn AppealRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
}

impl Stores {
    pub fn from_backend<S: GradingStore>(store: Arc<S>) -> Self {
        Self {
            submissions: store.clone(),
            grades: store.clone(),
            appeals: store.clone(),
            assignments: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    grading: GradingSettings,
    stores: Stores,
    files: Option<Arc<dyn FileStorage>>,
    events: Arc<dyn EventSink>,
    jobs: Arc<dyn JobQueue>,
}

impl AppState {
    pub fn new(
        grading: GradingSettings,
        stores: Stores,
        files: Option<Arc<dyn FileStorage>>,
        events: Arc<dyn EventSink>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { grading, stores, files, events, jobs }) }
    }

    pub fn grading(&self) -> &GradingSettings {
        &self.inner.grading
    }

    pub fn submissions(&self) -> &dyn SubmissionRepository {
        self.inner.stores.submissions.as_ref()
    }

    pub fn grades(&self) -> &dyn GradeRepository {
        self.inner.stores.grades.as_ref()
    }

    pub fn appeals(&self) -> &dyn AppealRepository {
        self.inner.stores.appeals.as_ref()
    }

    pub fn assignments(&self) -> &dyn AssignmentRepository {
        self.inner.stores.assignments.as_ref()
    }

    pub fn files(&self) -> Option<&dyn FileStorage> {
        self.inner.files.as_deref()
    }

    pub fn events(&self) -> &dyn EventSink {
        self.inner.events.as_ref()
    }

    pub fn jobs(&self) -> &dyn JobQueue {
        self.inner.jobs.as_ref()
    }
}
