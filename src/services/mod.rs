pub mod appeals;
pub mod auto_grading;
pub mod events;
pub mod grade_calculator;
pub mod grading;
pub mod grading_actions;
pub mod grading_bulk;
pub mod grading_queue;
pub mod grading_strategy;
pub mod state_machine;
pub mod storage;
