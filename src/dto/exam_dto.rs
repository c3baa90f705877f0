use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::question::{PaperType, Part};

/// A question as shown to the candidate, without its answer.
#[derive(Debug, Clone, Serialize)]
pub struct ExamQuestionView {
    pub position: i32,
    pub question_id: i64,
    pub part: String,
    pub part_label: &'static str,
    pub text: String,
    pub marks: Decimal,
    pub options: Vec<String>,
    pub saved_answer: Option<String>,
}

impl ExamQuestionView {
    pub fn part_label_for(part: &str) -> &'static str {
        part.parse::<Part>().map(Part::label).unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamView {
    pub session_id: i64,
    pub paper_type: PaperType,
    pub question_set: String,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_minutes: i32,
    pub remaining_seconds: i64,
    pub questions: Vec<ExamQuestionView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveAnswerPayload {
    pub question_id: i64,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswer {
    pub question_id: i64,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    pub answers: Vec<SubmitAnswer>,
    #[serde(default)]
    pub terminated: bool,
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResult {
    pub session_id: i64,
    pub paper_type: PaperType,
    pub answered: usize,
    pub total_questions: i32,
    pub objective_score: Decimal,
    pub slot_consumed: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamStatus {
    pub slot_status: String,
    pub can_start_exam: bool,
    pub next_exam_type: Option<PaperType>,
    pub is_primary_completed: bool,
    pub is_secondary_completed: bool,
    pub session: Option<SessionProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionProgress {
    pub session_id: i64,
    pub paper_type: PaperType,
    pub answered: i64,
    pub total_questions: i32,
    pub remaining_seconds: i64,
}
