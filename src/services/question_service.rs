use sqlx::{PgExecutor, PgPool};
use std::collections::{HashMap, HashSet};

use crate::dto::admin_dto::{QuestionFilter, UploadSummary};
use crate::error::{Error, Result};
use crate::models::question::{NewQuestion, Question, QUESTION_COLUMNS};
use crate::models::trade::normalize_trade_name;
use crate::models::upload::{QuestionUpload, UploadFormat};
use crate::services::csv_processor::parse_questions_csv;
use crate::services::question_import::{load_questions_from_excel, ImportedQuestion};
use crate::services::trade_service::TradeService;
use crate::utils::dat::decrypt_or_load_excel_bytes;

/// Identity used to skip duplicates: text, part and owning trade (None for common).
type DedupKey = (String, String, Option<i64>);

fn dedup_key(text: &str, part: &str, trade_id: Option<i64>, is_common: bool) -> DedupKey {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (text, part.to_string(), if is_common { None } else { trade_id })
}

/// Binds a workbook row to a trade. Common rows may carry no trade at all;
/// trade-specific rows whose trade is unknown yield `None`.
pub fn resolve_imported(q: ImportedQuestion, trades: &HashMap<String, i64>) -> Option<NewQuestion> {
    let trade_id = match q.trade.as_str() {
        "" | "ALL" => None,
        name => trades.get(&normalize_trade_name(name)).copied(),
    };
    let is_common = q.is_common();
    if !is_common && trade_id.is_none() {
        return None;
    }
    let [option_a, option_b, option_c, option_d] = q.options;
    Some(NewQuestion {
        text: q.text,
        part: q.part,
        marks: q.marks,
        option_a,
        option_b,
        option_c,
        option_d,
        correct_answer: q.correct_answer,
        trade_id,
        paper_type: q.paper_type,
        question_set: q.question_set,
        is_common,
        is_active: true,
    })
}

async fn insert_question<'e, E>(executor: E, q: &NewQuestion) -> Result<Question>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, Question>(&format!(
        r#"
        INSERT INTO questions (text, part, marks, option_a, option_b, option_c, option_d, correct_answer,
                               trade_id, paper_type, question_set, is_common, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        QUESTION_COLUMNS
    ))
    .bind(q.text.trim())
    .bind(q.part.as_str())
    .bind(q.marks)
    .bind(&q.option_a)
    .bind(&q.option_b)
    .bind(&q.option_c)
    .bind(&q.option_d)
    .bind(&q.correct_answer)
    .bind(q.trade_id)
    .bind(q.paper_type.as_str())
    .bind(q.question_set.as_string())
    .bind(q.is_common)
    .bind(q.is_active)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

#[derive(Clone)]
pub struct QuestionService {
    pool: PgPool,
    trades: TradeService,
}

impl QuestionService {
    pub fn new(pool: PgPool) -> Self {
        let trades = TradeService::new(pool.clone());
        Self { pool, trades }
    }

    pub async fn list(&self, filter: &QuestionFilter) -> Result<Vec<Question>> {
        let limit = filter.limit.unwrap_or(200).clamp(1, 1000);
        let offset = filter.offset.unwrap_or(0).max(0);
        let rows = sqlx::query_as::<_, Question>(&format!(
            r#"
            SELECT {} FROM questions
            WHERE ($1::BIGINT IS NULL OR trade_id = $1)
              AND ($2::TEXT IS NULL OR paper_type = $2)
              AND ($3::TEXT IS NULL OR part = $3)
              AND ($4::TEXT IS NULL OR question_set = $4)
              AND ($5::BOOLEAN IS NULL OR is_active = $5)
            ORDER BY id
            LIMIT $6 OFFSET $7
            "#,
            QUESTION_COLUMNS
        ))
        .bind(filter.trade_id)
        .bind(filter.paper_type.map(|p| p.as_str()))
        .bind(filter.part.map(|p| p.as_str()))
        .bind(filter.question_set.map(|s| s.as_string()))
        .bind(filter.is_active)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create(&self, q: &NewQuestion) -> Result<Question> {
        if q.text.trim().is_empty() {
            return Err(Error::BadRequest("Question text is required".to_string()));
        }
        if q.marks <= rust_decimal::Decimal::ZERO {
            return Err(Error::BadRequest("Marks must be greater than 0".to_string()));
        }
        if let Some(id) = q.trade_id {
            self.trades.get(id).await?;
        } else if !q.is_common {
            return Err(Error::BadRequest("A trade is required unless the question is common".to_string()));
        }
        let row = insert_question(&self.pool, q).await?;
        tracing::info!(question_id = row.id, part = %row.part, paper_type = %row.paper_type, "question created");
        Ok(row)
    }

    pub async fn set_active(&self, id: i64, is_active: bool) -> Result<Question> {
        sqlx::query_as::<_, Question>(&format!(
            "UPDATE questions SET is_active = $2 WHERE id = $1 RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Question {} not found", id)))
    }

    /// Refuses to delete questions already drawn into a session; deactivate those instead.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let in_use: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM exam_questions WHERE question_id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if in_use {
            return Err(Error::Conflict(format!(
                "Question {} is part of an exam session; deactivate it instead",
                id
            )));
        }
        let done = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Question {} not found", id)));
        }
        tracing::info!(question_id = id, "question deleted");
        Ok(())
    }

    /// Strict upload: one bad row rejects the file and nothing is written.
    pub async fn import_csv(&self, file_name: &str, content: &[u8], uploaded_by: Option<i64>) -> Result<UploadSummary> {
        let trades = self.trades.code_map().await?;
        let questions = parse_questions_csv(content, &trades).map_err(|rows| {
            tracing::warn!(file_name, errors = rows.len(), "csv upload rejected");
            Error::ImportRejected(rows)
        })?;

        let mut tx = self.pool.begin().await?;
        for q in &questions {
            insert_question(&mut *tx, q).await?;
        }
        let upload = record_upload(&mut *tx, file_name, UploadFormat::Csv, questions.len(), 0, uploaded_by).await?;
        tx.commit().await?;

        tracing::info!(file_name, created = questions.len(), "csv upload imported");
        Ok(summary(upload))
    }

    /// Lenient upload of `.dat` or `.xlsx`: duplicates and rows for unknown
    /// trades are skipped and counted.
    pub async fn import_excel(
        &self,
        file_name: &str,
        format: UploadFormat,
        content: &[u8],
        passphrase: &str,
        uploaded_by: Option<i64>,
    ) -> Result<UploadSummary> {
        let workbook = decrypt_or_load_excel_bytes(content, passphrase)?;
        let imported = load_questions_from_excel(&workbook)?;
        let trades = self.trades.lookup_map().await?;

        let existing: Vec<(String, String, Option<i64>, bool)> =
            sqlx::query_as("SELECT text, part, trade_id, is_common FROM questions")
                .fetch_all(&self.pool)
                .await?;
        let mut seen: HashSet<DedupKey> = existing
            .iter()
            .map(|(text, part, trade_id, common)| dedup_key(text, part, *trade_id, *common))
            .collect();

        let mut skipped = 0usize;
        let mut fresh = Vec::new();
        for row in imported {
            let Some(q) = resolve_imported(row, &trades) else {
                skipped += 1;
                continue;
            };
            if seen.insert(dedup_key(&q.text, q.part.as_str(), q.trade_id, q.is_common)) {
                fresh.push(q);
            } else {
                skipped += 1;
            }
        }

        let mut tx = self.pool.begin().await?;
        for q in &fresh {
            insert_question(&mut *tx, q).await?;
        }
        let upload = record_upload(&mut *tx, file_name, format, fresh.len(), skipped, uploaded_by).await?;
        tx.commit().await?;

        tracing::info!(file_name, format = format.as_str(), created = fresh.len(), skipped, "workbook upload imported");
        Ok(summary(upload))
    }

    pub async fn list_uploads(&self, limit: i64) -> Result<Vec<QuestionUpload>> {
        let rows = sqlx::query_as::<_, QuestionUpload>(
            r#"
            SELECT id, file_name, format, created_count, skipped_count, uploaded_by, uploaded_at
            FROM question_uploads
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn record_upload<'e, E>(
    executor: E,
    file_name: &str,
    format: UploadFormat,
    created: usize,
    skipped: usize,
    uploaded_by: Option<i64>,
) -> Result<QuestionUpload>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, QuestionUpload>(
        r#"
        INSERT INTO question_uploads (file_name, format, created_count, skipped_count, uploaded_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, file_name, format, created_count, skipped_count, uploaded_by, uploaded_at
        "#,
    )
    .bind(file_name)
    .bind(format.as_str())
    .bind(created as i32)
    .bind(skipped as i32)
    .bind(uploaded_by)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

fn summary(upload: QuestionUpload) -> UploadSummary {
    UploadSummary {
        upload_id: upload.id,
        file_name: upload.file_name,
        format: upload.format,
        created: upload.created_count,
        skipped: upload.skipped_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{PaperType, Part, QuestionSet};
    use rust_decimal::Decimal;

    fn imported(trade: &str, paper_type: PaperType) -> ImportedQuestion {
        ImportedQuestion {
            text: "What is torque?".into(),
            part: Part::C,
            marks: Decimal::ONE,
            options: Default::default(),
            correct_answer: None,
            trade: trade.into(),
            paper_type,
            question_set: QuestionSet::DEFAULT,
        }
    }

    fn trades() -> HashMap<String, i64> {
        HashMap::from([("DMV".to_string(), 5), ("DRIVER MECHANICAL VEHICLE".to_string(), 5)])
    }

    #[test]
    fn trade_rows_resolve_by_normalised_name() {
        let q = resolve_imported(imported("driver  mechanical vehicle", PaperType::Primary), &trades()).unwrap();
        assert_eq!(q.trade_id, Some(5));
        assert!(!q.is_common);
    }

    #[test]
    fn unknown_trade_is_skipped_unless_common() {
        assert!(resolve_imported(imported("BAKER", PaperType::Primary), &trades()).is_none());
        let common = resolve_imported(imported("ALL", PaperType::Secondary), &trades()).unwrap();
        assert!(common.is_common);
        assert_eq!(common.trade_id, None);
    }

    #[test]
    fn duplicate_key_ignores_case_and_spacing() {
        assert_eq!(
            dedup_key("What  is Torque?", "C", Some(5), false),
            dedup_key("what is torque?", "C", Some(5), false)
        );
        assert_eq!(dedup_key("Q", "A", Some(5), true), dedup_key("Q", "A", None, true));
        assert_ne!(dedup_key("Q", "A", Some(5), false), dedup_key("Q", "A", Some(6), false));
    }
}
