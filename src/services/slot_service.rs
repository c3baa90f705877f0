use sqlx::{PgConnection, PgPool};

use crate::dto::candidate_dto::{BulkSlotFailure, BulkSlotResult};
use crate::error::{Error, Result};
use crate::models::candidate::{CandidateProfile, CANDIDATE_COLUMNS};
use crate::models::question::PaperType;
use crate::models::trade::Trade;
use crate::services::candidate_service::CandidateService;
use crate::services::paper_service::PaperService;
use crate::services::trade_service::TradeService;

/// Exam-slot lifecycle: No Slot, Available, Attempting, Consumed.
/// Every transition is a single conditional UPDATE.
#[derive(Clone)]
pub struct SlotService {
    pool: PgPool,
    candidates: CandidateService,
    papers: PaperService,
    trades: TradeService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Assign,
    Reset,
    Reassign,
}

impl SlotService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            candidates: CandidateService::new(pool.clone()),
            papers: PaperService::new(pool.clone()),
            trades: TradeService::new(pool.clone()),
            pool,
        }
    }

    pub async fn assign(&self, candidate_id: i64, assigned_by: Option<i64>) -> Result<CandidateProfile> {
        let profile = self.candidates.get(candidate_id).await?;
        let trade = self.trades.find(profile.trade_id).await?;
        let active = self.papers.active_papers(profile.trade_id).await?;
        let exam_type = profile
            .check_assign(trade.as_ref(), active)
            .map_err(Error::Rejected)?;

        let updated = sqlx::query_as::<_, CandidateProfile>(&format!(
            r#"
            UPDATE candidate_profiles
            SET has_exam_slot = TRUE,
                slot_assigned_at = NOW(),
                slot_attempting_at = NULL,
                slot_consumed_at = NULL,
                slot_assigned_by = $2
            WHERE id = $1 AND NOT (has_exam_slot AND slot_consumed_at IS NULL)
            RETURNING {}
            "#,
            CANDIDATE_COLUMNS
        ))
        .bind(candidate_id)
        .bind(assigned_by)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::Conflict("Candidate already has an active exam slot.".to_string()))?;

        tracing::info!(candidate_id, exam_type = %exam_type, assigned_by, "exam slot assigned");
        Ok(updated)
    }

    /// Marks the attempt as started. Returns whether the row changed; an
    /// attempt already underway is not an error.
    pub async fn start_attempt(&self, profile: &CandidateProfile, trade: &Trade, paper_type: PaperType) -> Result<bool> {
        profile.may_attempt(paper_type, trade).map_err(Error::Rejected)?;
        let done = sqlx::query(
            r#"
            UPDATE candidate_profiles
            SET slot_attempting_at = NOW()
            WHERE id = $1 AND has_exam_slot AND slot_attempting_at IS NULL AND slot_consumed_at IS NULL
            "#,
        )
        .bind(profile.id)
        .execute(&self.pool)
        .await?;
        let started = done.rows_affected() == 1;
        if started {
            tracing::info!(candidate_id = profile.id, paper_type = %paper_type, "exam attempt started");
        }
        Ok(started)
    }

    /// Consumes the held slot for `paper_type` inside the caller's transaction.
    /// Returns false when no slot is held or the paper is no longer active for
    /// the trade, leaving the row untouched.
    pub async fn consume(conn: &mut PgConnection, candidate_id: i64, paper_type: PaperType) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE candidate_profiles c
            SET is_primary_completed = c.is_primary_completed OR $2 = 'PRIMARY',
                is_secondary_completed = c.is_secondary_completed OR $2 = 'SECONDARY',
                slot_consumed_at = NOW(),
                has_exam_slot = FALSE,
                slot_attempting_at = NULL
            WHERE c.id = $1
              AND c.has_exam_slot
              AND EXISTS (
                  SELECT 1 FROM paper_activations a
                  WHERE a.trade_id = c.trade_id AND a.paper_type = $2 AND a.is_active
              )
            "#,
        )
        .bind(candidate_id)
        .bind(paper_type.as_str())
        .execute(&mut *conn)
        .await?;
        let consumed = done.rows_affected() == 1;
        if consumed {
            tracing::info!(candidate_id, paper_type = %paper_type, "exam slot consumed");
        } else {
            tracing::warn!(candidate_id, paper_type = %paper_type, "exam slot not consumed");
        }
        Ok(consumed)
    }

    /// Drops unfinished sessions (and their autosaved answers) and clears the
    /// slot. Completion flags stay as they are.
    pub async fn reset(&self, candidate_id: i64) -> Result<CandidateProfile> {
        let mut tx = self.pool.begin().await?;
        let removed = clear_incomplete_for(&mut *tx, candidate_id).await?;
        let updated = sqlx::query_as::<_, CandidateProfile>(&format!(
            r#"
            UPDATE candidate_profiles
            SET has_exam_slot = FALSE,
                slot_assigned_at = NULL,
                slot_attempting_at = NULL,
                slot_consumed_at = NULL,
                slot_assigned_by = NULL
            WHERE id = $1
            RETURNING {}
            "#,
            CANDIDATE_COLUMNS
        ))
        .bind(candidate_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", candidate_id)))?;
        tx.commit().await?;
        tracing::info!(candidate_id, sessions_removed = removed, "exam slot reset");
        Ok(updated)
    }

    pub async fn reassign(&self, candidate_id: i64, assigned_by: Option<i64>) -> Result<CandidateProfile> {
        self.reset(candidate_id).await?;
        self.assign(candidate_id, assigned_by).await
    }

    /// Applies one action per candidate; failures are collected, not fatal.
    pub async fn bulk(&self, action: BulkAction, candidate_ids: &[i64], actor: Option<i64>) -> BulkSlotResult {
        let mut result = BulkSlotResult::default();
        for &id in candidate_ids {
            let outcome = match action {
                BulkAction::Assign => self.assign(id, actor).await,
                BulkAction::Reset => self.reset(id).await,
                BulkAction::Reassign => self.reassign(id, actor).await,
            };
            match outcome {
                Ok(_) => result.succeeded.push(id),
                Err(e) => result.failed.push(BulkSlotFailure {
                    candidate_id: id,
                    error: e.to_string(),
                }),
            }
        }
        tracing::info!(
            ?action,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "bulk slot operation"
        );
        result
    }

    /// Clears every slot and unfinished session. Returns the number of
    /// candidates whose slot fields changed.
    pub async fn reset_all(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM candidate_answers ca
            USING exam_sessions s
            WHERE s.candidate_id = ca.candidate_id AND s.paper_id = ca.paper_id AND s.completed_at IS NULL
            "#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM exam_sessions WHERE completed_at IS NULL")
            .execute(&mut *tx)
            .await?;
        let done = sqlx::query(
            r#"
            UPDATE candidate_profiles
            SET has_exam_slot = FALSE, slot_assigned_at = NULL, slot_attempting_at = NULL,
                slot_consumed_at = NULL, slot_assigned_by = NULL
            WHERE has_exam_slot OR slot_assigned_at IS NOT NULL
            "#,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(count = done.rows_affected(), "all exam slots reset");
        Ok(done.rows_affected())
    }
}

/// Deletes one candidate's unfinished sessions and the answers saved for
/// them. Returns the number of sessions removed.
pub async fn clear_incomplete_for(conn: &mut PgConnection, candidate_id: i64) -> Result<u64> {
    sqlx::query(
        r#"
        DELETE FROM candidate_answers ca
        USING exam_sessions s
        WHERE s.candidate_id = $1 AND ca.candidate_id = $1
          AND s.paper_id = ca.paper_id AND s.completed_at IS NULL
        "#,
    )
    .bind(candidate_id)
    .execute(&mut *conn)
    .await?;
    let done = sqlx::query("DELETE FROM exam_sessions WHERE candidate_id = $1 AND completed_at IS NULL")
        .bind(candidate_id)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected())
}
