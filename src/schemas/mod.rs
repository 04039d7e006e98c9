pub mod appeal;
pub mod grading;
