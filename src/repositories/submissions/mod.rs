mod commands;
mod queries;
mod types;

pub(crate) use commands::{set_late, transition, update_answer, update_score};
pub(crate) use queries::{find_by_id, list_answers, list_for_student, list_pending_manual};
