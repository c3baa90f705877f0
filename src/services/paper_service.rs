use serde::Deserialize;
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::models::activation::{ActivationView, PaperActivation, QuestionSetSummary};
use crate::models::candidate::ActivePapers;
use crate::models::question::{PaperType, QuestionSet};
use crate::models::question_paper::QuestionPaper;

const ACTIVATION_COLUMNS: &str =
    "id, trade_id, paper_type, is_active, question_set, exam_duration_minutes, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationUpdate {
    pub trade_id: i64,
    pub paper_type: PaperType,
    pub is_active: bool,
    #[serde(default)]
    pub question_set: Option<QuestionSet>,
    #[serde(default)]
    pub exam_duration_minutes: Option<i32>,
}

#[derive(Clone)]
pub struct PaperService {
    pool: PgPool,
}

impl PaperService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_papers(&self) -> Result<Vec<QuestionPaper>> {
        let papers = sqlx::query_as::<_, QuestionPaper>(
            "SELECT id, paper_type, is_active, exam_duration_minutes FROM question_papers ORDER BY paper_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(papers)
    }

    pub async fn paper(&self, paper_type: PaperType) -> Result<QuestionPaper> {
        sqlx::query_as::<_, QuestionPaper>(
            "SELECT id, paper_type, is_active, exam_duration_minutes FROM question_papers WHERE paper_type = $1",
        )
        .bind(paper_type.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Exam paper configuration missing for {}", paper_type)))
    }

    pub async fn paper_by_id(&self, id: i64) -> Result<QuestionPaper> {
        sqlx::query_as::<_, QuestionPaper>(
            "SELECT id, paper_type, is_active, exam_duration_minutes FROM question_papers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Question paper {} not found", id)))
    }

    pub async fn update_paper(
        &self,
        paper_type: PaperType,
        is_active: Option<bool>,
        exam_duration_minutes: Option<i32>,
    ) -> Result<QuestionPaper> {
        if matches!(exam_duration_minutes, Some(m) if m <= 0) {
            return Err(Error::BadRequest("Exam duration must be positive".to_string()));
        }
        let paper = sqlx::query_as::<_, QuestionPaper>(
            r#"
            UPDATE question_papers
            SET is_active = COALESCE($2, is_active),
                exam_duration_minutes = COALESCE($3, exam_duration_minutes)
            WHERE paper_type = $1
            RETURNING id, paper_type, is_active, exam_duration_minutes
            "#,
        )
        .bind(paper_type.as_str())
        .bind(is_active)
        .bind(exam_duration_minutes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Exam paper configuration missing for {}", paper_type)))?;
        tracing::info!(paper_type = %paper_type, is_active = paper.is_active, duration = paper.exam_duration_minutes, "paper updated");
        Ok(paper)
    }

    pub async fn list_activations(&self) -> Result<Vec<ActivationView>> {
        let rows = sqlx::query_as::<_, ActivationView>(
            r#"
            SELECT a.id, a.trade_id, t.code AS trade_code, t.name AS trade_name, a.paper_type,
                   a.is_active, a.question_set, a.exam_duration_minutes, a.updated_at
            FROM paper_activations a
            JOIN trades t ON t.id = a.trade_id
            ORDER BY t.code, a.paper_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn activation(&self, trade_id: i64, paper_type: PaperType) -> Result<Option<PaperActivation>> {
        let row = sqlx::query_as::<_, PaperActivation>(&format!(
            "SELECT {} FROM paper_activations WHERE trade_id = $1 AND paper_type = $2",
            ACTIVATION_COLUMNS
        ))
        .bind(trade_id)
        .bind(paper_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Live question set for (trade, paper type); "A" when nothing is configured.
    pub async fn active_question_set(&self, trade_id: Option<i64>, paper_type: PaperType) -> Result<QuestionSet> {
        let Some(trade_id) = trade_id else {
            return Ok(QuestionSet::DEFAULT);
        };
        Ok(self
            .activation(trade_id, paper_type)
            .await?
            .map(|a| a.question_set())
            .unwrap_or_default())
    }

    /// An activation counts only while the paper row itself is active too.
    pub async fn active_papers(&self, trade_id: Option<i64>) -> Result<ActivePapers> {
        let Some(trade_id) = trade_id else {
            return Ok(ActivePapers::default());
        };
        let active: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT a.paper_type
            FROM paper_activations a
            JOIN question_papers p ON p.paper_type = a.paper_type
            WHERE a.trade_id = $1 AND a.is_active AND p.is_active
            "#,
        )
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ActivePapers {
            primary: active.iter().any(|p| p == PaperType::Primary.as_str()),
            secondary: active.iter().any(|p| p == PaperType::Secondary.as_str()),
        })
    }

    /// Creates or updates the single activation row for (trade, paper type).
    /// A missing question set keeps the current one.
    pub async fn upsert_activation(&self, update: &ActivationUpdate) -> Result<PaperActivation> {
        if matches!(update.exam_duration_minutes, Some(m) if m <= 0) {
            return Err(Error::BadRequest("Exam duration must be positive".to_string()));
        }
        let row = sqlx::query_as::<_, PaperActivation>(&format!(
            r#"
            INSERT INTO paper_activations (trade_id, paper_type, is_active, question_set, exam_duration_minutes)
            VALUES ($1, $2, $3, COALESCE($4, 'A'), $5)
            ON CONFLICT (trade_id, paper_type) DO UPDATE
            SET is_active = EXCLUDED.is_active,
                question_set = COALESCE($4, paper_activations.question_set),
                exam_duration_minutes = EXCLUDED.exam_duration_minutes,
                updated_at = NOW()
            RETURNING {}
            "#,
            ACTIVATION_COLUMNS
        ))
        .bind(update.trade_id)
        .bind(update.paper_type.as_str())
        .bind(update.is_active)
        .bind(update.question_set.map(|s| s.as_string()))
        .bind(update.exam_duration_minutes)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(
            trade_id = row.trade_id,
            paper_type = %row.paper_type,
            is_active = row.is_active,
            question_set = %row.question_set,
            "paper activation saved"
        );
        Ok(row)
    }

    /// Makes `set` the live set for every (trade, paper type) pair that has one.
    /// Used by the CLI to rotate all trades at once.
    pub async fn activate_set_everywhere(&self, paper_type: PaperType, set: QuestionSet) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE paper_activations SET question_set = $2, updated_at = NOW() WHERE paper_type = $1",
        )
        .bind(paper_type.as_str())
        .bind(set.as_string())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    /// Active question counts per (trade, paper type, set).
    pub async fn available_sets(&self) -> Result<Vec<QuestionSetSummary>> {
        let rows = sqlx::query_as::<_, QuestionSetSummary>(
            r#"
            SELECT t.code AS trade_code, q.paper_type, q.question_set, COUNT(*) AS question_count
            FROM questions q
            LEFT JOIN trades t ON t.id = q.trade_id
            WHERE q.is_active
            GROUP BY t.code, q.paper_type, q.question_set
            ORDER BY t.code NULLS FIRST, q.paper_type, q.question_set
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
