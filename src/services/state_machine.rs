use crate::db::types::SubmissionState;
use crate::errors::{GradingError, GradingResult};

/// States a submission may leave in order to enter `to`.
pub fn legal_sources(to: SubmissionState) -> &'static [SubmissionState] {
    use SubmissionState::*;

    match to {
        AutoGraded => &[AutoGraded, PendingManualGrading],
        PendingManualGrading => &[AutoGraded, PendingManualGrading, Graded],
        Graded => &[PendingManualGrading],
        Released => &[Graded],
        InProgress => &[],
    }
}

/// One grading operation's move, with the states that operation may start from.
///
/// Narrower than [`legal_sources`]: both auto-grading and return-to-queue can
/// target `PendingManualGrading`, but only return-to-queue may leave `Graded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingStep {
    AutoGrade { needs_manual: bool },
    CompleteManual,
    Release,
    ReturnToQueue,
}

impl GradingStep {
    pub fn target(self) -> SubmissionState {
        match self {
            GradingStep::AutoGrade { needs_manual: true } | GradingStep::ReturnToQueue => {
                SubmissionState::PendingManualGrading
            }
            GradingStep::AutoGrade { needs_manual: false } => SubmissionState::AutoGraded,
            GradingStep::CompleteManual => SubmissionState::Graded,
            GradingStep::Release => SubmissionState::Released,
        }
    }

    pub fn sources(self) -> &'static [SubmissionState] {
        use SubmissionState::*;

        match self {
            GradingStep::AutoGrade { .. } => &[AutoGraded, PendingManualGrading],
            GradingStep::CompleteManual => &[PendingManualGrading],
            GradingStep::Release | GradingStep::ReturnToQueue => &[Graded],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GradingStep::AutoGrade { .. } => "auto-grade",
            GradingStep::CompleteManual => "complete grading of",
            GradingStep::Release => "release",
            GradingStep::ReturnToQueue => "return to queue",
        }
    }

    pub fn ensure_from(self, from: SubmissionState) -> GradingResult<()> {
        if self.sources().contains(&from) {
            return Ok(());
        }
        Err(GradingError::State(format!(
            "cannot {} a submission that is {}",
            self.name(),
            from.as_str()
        )))
    }
}

pub fn can_transition(from: SubmissionState, to: SubmissionState) -> bool {
    legal_sources(to).contains(&from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubmissionState::*;

    #[test]
    fn auto_grading_may_settle_either_way() {
        for from in [AutoGraded, PendingManualGrading] {
            assert!(can_transition(from, AutoGraded));
            assert!(can_transition(from, PendingManualGrading));
        }
    }

    #[test]
    fn manual_grading_completes_only_from_queue() {
        assert!(can_transition(PendingManualGrading, Graded));
        assert!(!can_transition(AutoGraded, Graded));
        assert!(!can_transition(Released, Graded));
    }

    #[test]
    fn release_requires_graded() {
        assert!(can_transition(Graded, Released));
        assert!(!can_transition(PendingManualGrading, Released));
        assert!(!can_transition(Released, Released));
    }

    #[test]
    fn return_to_queue_only_from_graded() {
        assert!(can_transition(Graded, PendingManualGrading));
        assert!(!can_transition(Released, PendingManualGrading));
        assert!(!can_transition(Graded, AutoGraded));
    }

    #[test]
    fn nothing_reenters_in_progress() {
        for from in [InProgress, AutoGraded, PendingManualGrading, Graded, Released] {
            assert!(!can_transition(from, InProgress));
        }
        assert!(!can_transition(InProgress, AutoGraded));
    }

    #[test]
    fn auto_grading_never_reopens_graded_work() {
        for needs_manual in [true, false] {
            let step = GradingStep::AutoGrade { needs_manual };
            for from in [InProgress, Graded, Released] {
                assert!(step.ensure_from(from).is_err(), "{from:?}");
            }
            assert!(step.ensure_from(AutoGraded).is_ok());
        }
        assert!(GradingStep::ReturnToQueue.ensure_from(Graded).is_ok());
        assert!(GradingStep::ReturnToQueue.ensure_from(AutoGraded).is_err());
    }

    #[test]
    fn step_sources_stay_within_the_transition_table() {
        for step in [
            GradingStep::AutoGrade { needs_manual: true },
            GradingStep::AutoGrade { needs_manual: false },
            GradingStep::CompleteManual,
            GradingStep::Release,
            GradingStep::ReturnToQueue,
        ] {
            for from in step.sources() {
                assert!(can_transition(*from, step.target()), "{step:?} from {from:?}");
            }
        }
    }

    #[test]
    fn illegal_transition_is_a_state_error() {
        let err = GradingStep::CompleteManual.ensure_from(Released).expect_err("illegal");
        assert!(matches!(err, GradingError::State(_)));
        assert!(err.to_string().contains("released"));
    }
}
