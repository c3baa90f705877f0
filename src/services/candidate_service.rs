use sqlx::PgPool;

use crate::dto::candidate_dto::{CandidateFilter, CandidateSummary, RegisterCandidatePayload};
use crate::error::{Error, Result};
use crate::models::candidate::{CandidateProfile, MarksEntry, CANDIDATE_COLUMNS};
use crate::models::question::PaperType;
use crate::models::user::Role;
use crate::services::auth_service::AuthService;
use crate::services::trade_service::TradeService;

#[derive(Clone)]
pub struct CandidateService {
    pool: PgPool,
    trades: TradeService,
}

impl CandidateService {
    pub fn new(pool: PgPool) -> Self {
        let trades = TradeService::new(pool.clone());
        Self { pool, trades }
    }

    /// Creates the CANDIDATE user and its profile in one transaction.
    pub async fn register(&self, payload: &RegisterCandidatePayload) -> Result<CandidateProfile> {
        payload.validate_all()?;
        let trade = self.trades.get(payload.trade_id).await?;

        let mut tx = self.pool.begin().await?;
        let user = AuthService::create_user(&mut *tx, &payload.username, &payload.password, Role::Candidate).await?;
        let profile = sqlx::query_as::<_, CandidateProfile>(&format!(
            r#"
            INSERT INTO candidate_profiles (
                user_id, army_no, rank, name, father_name, unit, brigade, corps, command, trade_id,
                dob, doe, aadhar_number, mobile_no, apaar_id, nsqf_level, exam_center, training_center,
                state, district, primary_qualification, primary_duration, primary_credits,
                secondary_qualification, secondary_duration, secondary_credits
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                    $19, $20, $21, $22, $23, $24, $25, $26)
            RETURNING {}
            "#,
            CANDIDATE_COLUMNS
        ))
        .bind(user.id)
        .bind(payload.army_no.trim())
        .bind(payload.rank.trim())
        .bind(payload.name.trim())
        .bind(payload.father_name.trim())
        .bind(&payload.unit)
        .bind(&payload.brigade)
        .bind(&payload.corps)
        .bind(&payload.command)
        .bind(trade.id)
        .bind(payload.dob.trim())
        .bind(payload.doe)
        .bind(payload.aadhar_number.trim())
        .bind(&payload.mobile_no)
        .bind(payload.apaar_id.trim())
        .bind(payload.nsqf_level.trim())
        .bind(&payload.exam_center)
        .bind(&payload.training_center)
        .bind(payload.state.trim())
        .bind(payload.district.trim())
        .bind(&payload.primary_qualification)
        .bind(&payload.primary_duration)
        .bind(&payload.primary_credits)
        .bind(&payload.secondary_qualification)
        .bind(&payload.secondary_duration)
        .bind(&payload.secondary_credits)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(candidate_id = profile.id, army_no = %profile.army_no, trade = %trade.code, "candidate registered");
        Ok(profile)
    }

    pub async fn get(&self, id: i64) -> Result<CandidateProfile> {
        sqlx::query_as::<_, CandidateProfile>(&format!(
            "SELECT {} FROM candidate_profiles WHERE id = $1",
            CANDIDATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", id)))
    }

    pub async fn get_by_user(&self, user_id: i64) -> Result<CandidateProfile> {
        sqlx::query_as::<_, CandidateProfile>(&format!(
            "SELECT {} FROM candidate_profiles WHERE user_id = $1",
            CANDIDATE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Candidate profile not found".to_string()))
    }

    pub async fn get_by_army_no(&self, army_no: &str) -> Result<CandidateProfile> {
        sqlx::query_as::<_, CandidateProfile>(&format!(
            "SELECT {} FROM candidate_profiles WHERE army_no = $1",
            CANDIDATE_COLUMNS
        ))
        .bind(army_no.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate with army number '{}' not found", army_no.trim())))
    }

    pub async fn list_profiles(&self, filter: &CandidateFilter) -> Result<Vec<CandidateProfile>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let rows = sqlx::query_as::<_, CandidateProfile>(&format!(
            r#"
            SELECT {} FROM candidate_profiles
            WHERE ($1::BIGINT IS NULL OR trade_id = $1)
              AND ($2::BOOLEAN IS NULL OR has_exam_slot = $2)
              AND ($3::TEXT IS NULL OR name ILIKE $3 OR army_no ILIKE $3)
            ORDER BY id
            "#,
            CANDIDATE_COLUMNS
        ))
        .bind(filter.trade_id)
        .bind(filter.has_slot)
        .bind(search)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list(&self, filter: &CandidateFilter) -> Result<Vec<CandidateSummary>> {
        let profiles = self.list_profiles(filter).await?;
        let trades = self.trades.list().await?;
        Ok(profiles
            .iter()
            .map(|p| {
                let code = p
                    .trade_id
                    .and_then(|id| trades.iter().find(|t| t.id == id))
                    .map(|t| t.code.clone());
                CandidateSummary::new(p, code)
            })
            .collect())
    }

    /// Validates against the trade's limits and recomputes completion flags.
    /// The row is locked for the read-modify-write so concurrent edits of
    /// the other paper type are not lost.
    pub async fn update_marks(&self, id: i64, paper_type: PaperType, entry: MarksEntry) -> Result<CandidateProfile> {
        let mut tx = self.pool.begin().await?;
        let mut profile = sqlx::query_as::<_, CandidateProfile>(&format!(
            "SELECT {} FROM candidate_profiles WHERE id = $1 FOR UPDATE",
            CANDIDATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", id)))?;
        let trade = self
            .trades
            .find(profile.trade_id)
            .await?
            .ok_or_else(|| Error::Rejected("Candidate has no trade assigned.".to_string()))?;
        profile
            .validate_marks(&trade, paper_type, entry)
            .map_err(Error::Rejected)?;
        profile.apply_marks(paper_type, entry);

        let updated = sqlx::query_as::<_, CandidateProfile>(&format!(
            r#"
            UPDATE candidate_profiles
            SET primary_practical_marks = $2, primary_viva_marks = $3,
                secondary_practical_marks = $4, secondary_viva_marks = $5,
                is_primary_completed = $6, is_secondary_completed = $7
            WHERE id = $1
            RETURNING {}
            "#,
            CANDIDATE_COLUMNS
        ))
        .bind(id)
        .bind(profile.primary_practical_marks)
        .bind(profile.primary_viva_marks)
        .bind(profile.secondary_practical_marks)
        .bind(profile.secondary_viva_marks)
        .bind(profile.is_primary_completed)
        .bind(profile.is_secondary_completed)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(candidate_id = id, paper_type = %paper_type, "marks updated");
        Ok(updated)
    }

    pub async fn set_primary_bypass(&self, id: i64, allowed: bool) -> Result<CandidateProfile> {
        sqlx::query_as::<_, CandidateProfile>(&format!(
            "UPDATE candidate_profiles SET primary_bypass_allowed = $2 WHERE id = $1 RETURNING {}",
            CANDIDATE_COLUMNS
        ))
        .bind(id)
        .bind(allowed)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Candidate {} not found", id)))
    }

    /// Removes the profile, its answers and sessions, and the owning user.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let profile = self.get(id).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM candidate_answers WHERE candidate_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM exam_sessions WHERE candidate_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM candidate_profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1 AND role = 'CANDIDATE'")
            .bind(profile.user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(candidate_id = id, army_no = %profile.army_no, "candidate deleted");
        Ok(())
    }
}
