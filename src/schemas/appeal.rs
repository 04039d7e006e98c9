use serde::{Deserialize, Serialize};
use validator::Validate;

use super::grading::not_blank;

/// An uploaded supporting document, before it reaches file storage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppealUpload {
    pub filename: String,
    pub content_type: String,
    #[serde(default, skip_serializing)]
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAppealRequest {
    #[validate(custom(function = "not_blank", message = "an appeal reason is required"))]
    pub reason: String,
    #[validate(length(max = 10, message = "at most 10 supporting documents"))]
    #[serde(default)]
    pub documents: Vec<AppealUpload>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DenyAppealRequest {
    #[validate(custom(function = "not_blank", message = "a denial reason is required"))]
    pub reason: String,
}
