use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{PaperType, Part, QuestionSet};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTradePayload {
    #[validate(length(min = 1, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionFilter {
    pub trade_id: Option<i64>,
    pub paper_type: Option<PaperType>,
    pub part: Option<Part>,
    pub question_set: Option<QuestionSet>,
    pub is_active: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActivePayload {
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePaperPayload {
    pub is_active: Option<bool>,
    pub exam_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub upload_id: i64,
    pub file_name: String,
    pub format: String,
    pub created: i32,
    pub skipped: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupPayload {
    pub level: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearSessionsPayload {
    pub trade_id: Option<i64>,
    pub candidate_id: Option<i64>,
    pub paper_type: Option<PaperType>,
}
