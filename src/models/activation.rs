use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::{PaperType, QuestionSet};

/// Live state of one (trade, paper type): whether it may be attempted and
/// which question set sessions draw from.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaperActivation {
    pub id: i64,
    pub trade_id: i64,
    pub paper_type: String,
    pub is_active: bool,
    pub question_set: String,
    pub exam_duration_minutes: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl PaperActivation {
    pub fn paper_type(&self) -> Option<PaperType> {
        self.paper_type.parse().ok()
    }

    pub fn question_set(&self) -> QuestionSet {
        self.question_set.parse().unwrap_or_default()
    }
}

/// Activation joined with its trade, for listings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivationView {
    pub id: i64,
    pub trade_id: i64,
    pub trade_code: String,
    pub trade_name: String,
    pub paper_type: String,
    pub is_active: bool,
    pub question_set: String,
    pub exam_duration_minutes: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Question count of one pool, as offered when choosing a set to activate.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuestionSetSummary {
    pub trade_code: Option<String>,
    pub paper_type: String,
    pub question_set: String,
    pub question_count: i64,
}
