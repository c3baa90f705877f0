use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeMap, HashMap};

use crate::dto::exam_dto::{
    ExamQuestionView, ExamStatus, ExamView, SessionProgress, SubmitPayload, SubmitResult,
};
use crate::error::{Error, Result};
use crate::models::candidate::{ActivePapers, CandidateProfile, SlotState};
use crate::models::exam_session::ExamSession;
use crate::models::question::{PaperType, Part, Question, QUESTION_COLUMNS};
use crate::models::question_paper::{distribution_for, QuestionPaper};
use crate::models::trade::Trade;
use crate::services::candidate_service::CandidateService;
use crate::services::paper_service::PaperService;
use crate::services::selection::select_questions;
use crate::services::slot_service::SlotService;
use crate::services::trade_service::TradeService;
use crate::utils::time::now;

const SESSION_COLUMNS: &str = "id, paper_id, candidate_id, trade_id, question_set, started_at, completed_at, \
    duration_minutes, total_questions, score";

#[derive(Debug, FromRow)]
struct SessionQuestionRow {
    position: i32,
    question_id: i64,
    part: String,
    text: String,
    marks: Decimal,
    option_a: Option<String>,
    option_b: Option<String>,
    option_c: Option<String>,
    option_d: Option<String>,
    saved_answer: Option<String>,
}

#[derive(Debug, FromRow)]
struct GradingRow {
    question_id: i64,
    part: String,
    marks: Decimal,
    correct_answer: Option<String>,
}

/// Parts whose answers can be checked mechanically.
pub fn is_objective(part: Part) -> bool {
    matches!(part, Part::A | Part::B | Part::D | Part::F)
}

fn normalize_answer(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn answers_match(correct: &str, given: &str) -> bool {
    let given = normalize_answer(given);
    !given.is_empty() && normalize_answer(correct) == given
}

/// Paper the candidate sits now: their next exam type, provided it is
/// active and still open. Agrees with `can_start_exam`.
pub fn pick_paper_type(profile: &CandidateProfile, trade: &Trade, active: ActivePapers) -> Option<PaperType> {
    let paper_type = profile.next_exam_type(trade);
    (active.is_active(paper_type) && profile.may_attempt(paper_type, trade).is_ok()).then_some(paper_type)
}

fn refusal_reason(profile: &CandidateProfile, trade: &Trade) -> String {
    match profile.slot_state() {
        SlotState::NoSlot => "No exam slot assigned. Contact admin to assign an exam slot.".to_string(),
        SlotState::Consumed(at) => format!(
            "Exam slot already used on {}. Contact admin to assign a new slot.",
            at.format("%Y-%m-%d %H:%M")
        ),
        _ => format!("No active exam found for trade {}. Contact admin.", trade.code),
    }
}

#[derive(Clone)]
pub struct ExamService {
    pool: PgPool,
    candidates: CandidateService,
    papers: PaperService,
    trades: TradeService,
    slots: SlotService,
}

impl ExamService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            candidates: CandidateService::new(pool.clone()),
            papers: PaperService::new(pool.clone()),
            trades: TradeService::new(pool.clone()),
            slots: SlotService::new(pool.clone()),
            pool,
        }
    }

    /// Draws a fresh question list for `paper` and stores it as a new session.
    /// Nothing is written when any part of the distribution is short.
    pub async fn generate_for_candidate(
        &self,
        candidate: &CandidateProfile,
        trade: Option<&Trade>,
        paper: &QuestionPaper,
    ) -> Result<ExamSession> {
        let paper_type = paper
            .paper_type()
            .ok_or_else(|| Error::Internal(format!("Unknown paper type '{}'", paper.paper_type)))?;
        let trade_id = trade.map(|t| t.id);
        if paper_type == PaperType::Primary && trade_id.is_none() {
            return Err(Error::Rejected("Candidate has no trade assigned.".to_string()));
        }

        let distribution = distribution_for(paper_type, trade);
        let question_set = self.papers.active_question_set(trade_id, paper_type).await?;

        let pool: Vec<Question> = sqlx::query_as::<_, Question>(&format!(
            r#"
            SELECT {} FROM questions
            WHERE is_active
              AND paper_type = $1
              AND question_set = $2
              AND (($1 = 'PRIMARY' AND trade_id = $3) OR ($1 = 'SECONDARY' AND is_common))
            "#,
            QUESTION_COLUMNS
        ))
        .bind(paper_type.as_str())
        .bind(question_set.as_string())
        .bind(trade_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_part: BTreeMap<Part, Vec<Question>> = BTreeMap::new();
        for q in pool {
            if let Some(part) = q.part() {
                by_part.entry(part).or_default().push(q);
            }
        }

        let selected = {
            let mut rng = rand::thread_rng();
            select_questions(&distribution, &by_part, &mut rng)
        }
        .map_err(|e| {
            tracing::warn!(
                candidate_id = candidate.id,
                paper_type = %paper_type,
                question_set = %question_set,
                reason = %e,
                "session generation refused"
            );
            Error::Rejected(e.to_string())
        })?;

        let duration = match trade_id {
            Some(id) => self
                .papers
                .activation(id, paper_type)
                .await?
                .and_then(|a| a.exam_duration_minutes),
            None => None,
        }
        .unwrap_or(paper.exam_duration_minutes);

        let question_ids: Vec<i64> = selected.iter().map(|q| q.id).collect();
        let positions: Vec<i32> = (1..=question_ids.len() as i32).collect();

        let mut tx = self.pool.begin().await?;
        let session = sqlx::query_as::<_, ExamSession>(&format!(
            r#"
            INSERT INTO exam_sessions (paper_id, candidate_id, trade_id, question_set, duration_minutes, total_questions)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(paper.id)
        .bind(candidate.id)
        .bind(if paper_type == PaperType::Primary { trade_id } else { None })
        .bind(question_set.as_string())
        .bind(duration)
        .bind(question_ids.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO exam_questions (session_id, question_id, position)
            SELECT $1, q, p FROM UNNEST($2::BIGINT[], $3::INT[]) AS t(q, p)
            "#,
        )
        .bind(session.id)
        .bind(&question_ids)
        .bind(&positions)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            session_id = session.id,
            candidate_id = candidate.id,
            paper_type = %paper_type,
            question_set = %question_set,
            questions = question_ids.len(),
            "exam session generated"
        );
        Ok(session)
    }

    async fn open_session(&self, candidate_id: i64, paper_id: Option<i64>) -> Result<Option<ExamSession>> {
        let session = sqlx::query_as::<_, ExamSession>(&format!(
            r#"
            SELECT {} FROM exam_sessions
            WHERE candidate_id = $1 AND completed_at IS NULL AND ($2::BIGINT IS NULL OR paper_id = $2)
            ORDER BY id DESC
            LIMIT 1
            "#,
            SESSION_COLUMNS
        ))
        .bind(candidate_id)
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    fn effective_duration(session: &ExamSession, override_minutes: Option<i32>, paper: &QuestionPaper) -> i32 {
        override_minutes
            .or(session.duration_minutes)
            .unwrap_or(paper.exam_duration_minutes)
    }

    /// Minutes allowed for `session` right now. The trade's current override
    /// wins over the value frozen into the session.
    async fn session_duration(
        &self,
        session: &ExamSession,
        trade_id: Option<i64>,
        paper_type: PaperType,
        paper: &QuestionPaper,
    ) -> Result<i32> {
        let override_minutes = match trade_id {
            Some(id) => self
                .papers
                .activation(id, paper_type)
                .await?
                .and_then(|a| a.exam_duration_minutes),
            None => None,
        };
        Ok(Self::effective_duration(session, override_minutes, paper))
    }

    /// Opens (or resumes) the candidate's exam and returns it without answers.
    pub async fn begin(&self, user_id: i64) -> Result<ExamView> {
        let profile = self.candidates.get_by_user(user_id).await?;
        let trade = self
            .trades
            .find(profile.trade_id)
            .await?
            .ok_or_else(|| Error::Forbidden("Trade not assigned. Contact admin.".to_string()))?;
        let active = self.papers.active_papers(Some(trade.id)).await?;

        if !profile.can_start_exam(Some(&trade), active) {
            return Err(Error::Forbidden(refusal_reason(&profile, &trade)));
        }
        let paper_type = pick_paper_type(&profile, &trade, active)
            .ok_or_else(|| Error::Forbidden(refusal_reason(&profile, &trade)))?;
        let paper = self.papers.paper(paper_type).await?;
        if !paper.is_active {
            return Err(Error::Forbidden(format!(
                "Exam paper configuration missing for {}. Contact admin.",
                paper_type
            )));
        }

        self.slots.start_attempt(&profile, &trade, paper_type).await?;

        let session = match self.open_session(profile.id, Some(paper.id)).await? {
            Some(existing) => {
                tracing::info!(session_id = existing.id, candidate_id = profile.id, "resuming exam session");
                existing
            }
            None => self.generate_for_candidate(&profile, Some(&trade), &paper).await?,
        };

        let session = sqlx::query_as::<_, ExamSession>(&format!(
            "UPDATE exam_sessions SET started_at = COALESCE(started_at, NOW()) WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .fetch_one(&self.pool)
        .await?;

        let duration = self.session_duration(&session, Some(trade.id), paper_type, &paper).await?;

        let rows = sqlx::query_as::<_, SessionQuestionRow>(
            r#"
            SELECT eq.position, q.id AS question_id, q.part, q.text, q.marks,
                   q.option_a, q.option_b, q.option_c, q.option_d,
                   ca.answer AS saved_answer
            FROM exam_questions eq
            JOIN questions q ON q.id = eq.question_id
            LEFT JOIN candidate_answers ca
                   ON ca.candidate_id = $2 AND ca.paper_id = $3
                  AND ca.question_id = q.id AND ca.exam_type = $4
            WHERE eq.session_id = $1
            ORDER BY eq.position
            "#,
        )
        .bind(session.id)
        .bind(profile.id)
        .bind(paper.id)
        .bind(paper_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        let questions = rows
            .into_iter()
            .map(|r| ExamQuestionView {
                position: r.position,
                question_id: r.question_id,
                part_label: ExamQuestionView::part_label_for(&r.part),
                part: r.part,
                text: r.text,
                marks: r.marks,
                options: [r.option_a, r.option_b, r.option_c, r.option_d]
                    .into_iter()
                    .flatten()
                    .collect(),
                saved_answer: r.saved_answer,
            })
            .collect();

        Ok(ExamView {
            session_id: session.id,
            paper_type,
            question_set: session.question_set.clone(),
            started_at: session.started_at,
            duration_minutes: duration,
            remaining_seconds: session.remaining_seconds(duration, now()),
            questions,
        })
    }

    /// Autosaves one answer into the candidate's open session.
    pub async fn save_answer(&self, user_id: i64, question_id: i64, answer: Option<String>) -> Result<()> {
        let profile = self.candidates.get_by_user(user_id).await?;
        let session = self
            .open_session(profile.id, None)
            .await?
            .ok_or_else(|| Error::Rejected("No exam in progress.".to_string()))?;
        let paper = self.papers.paper_by_id(session.paper_id).await?;
        let paper_type = paper
            .paper_type()
            .ok_or_else(|| Error::Internal(format!("Unknown paper type '{}'", paper.paper_type)))?;

        let duration = self.session_duration(&session, profile.trade_id, paper_type, &paper).await?;
        if session.started_at.is_some() && session.remaining_seconds(duration, now()) == 0 {
            return Err(Error::Rejected("Exam time is over. Please submit.".to_string()));
        }

        let in_session: Option<i64> = sqlx::query_scalar(
            "SELECT question_id FROM exam_questions WHERE session_id = $1 AND question_id = $2",
        )
        .bind(session.id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;
        if in_session.is_none() {
            return Err(Error::BadRequest(format!("Question {} is not part of this exam", question_id)));
        }

        upsert_answer(&self.pool, profile.id, paper.id, question_id, paper_type, answer.as_deref()).await?;
        tracing::debug!(session_id = session.id, question_id, "answer autosaved");
        Ok(())
    }

    /// Stores the final answers, closes the session and consumes the slot,
    /// all in one transaction.
    pub async fn submit(&self, user_id: i64, payload: &SubmitPayload) -> Result<SubmitResult> {
        let profile = self.candidates.get_by_user(user_id).await?;
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, ExamSession>(&format!(
            r#"
            SELECT {} FROM exam_sessions
            WHERE candidate_id = $1 AND completed_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            FOR UPDATE
            "#,
            SESSION_COLUMNS
        ))
        .bind(profile.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::Rejected("No exam in progress.".to_string()))?;
        let paper = self.papers.paper_by_id(session.paper_id).await?;
        let paper_type = paper
            .paper_type()
            .ok_or_else(|| Error::Internal(format!("Unknown paper type '{}'", paper.paper_type)))?;

        let grading = sqlx::query_as::<_, GradingRow>(
            r#"
            SELECT q.id AS question_id, q.part, q.marks, q.correct_answer
            FROM exam_questions eq
            JOIN questions q ON q.id = eq.question_id
            WHERE eq.session_id = $1
            "#,
        )
        .bind(session.id)
        .fetch_all(&mut *tx)
        .await?;
        let in_session: HashMap<i64, &GradingRow> = grading.iter().map(|g| (g.question_id, g)).collect();

        for a in &payload.answers {
            if !in_session.contains_key(&a.question_id) {
                tracing::warn!(session_id = session.id, question_id = a.question_id, "ignoring answer outside session");
                continue;
            }
            upsert_answer(&mut *tx, profile.id, paper.id, a.question_id, paper_type, a.answer.as_deref()).await?;
        }

        let stored: Vec<(i64, Option<String>)> = sqlx::query_as(
            "SELECT question_id, answer FROM candidate_answers WHERE candidate_id = $1 AND paper_id = $2 AND exam_type = $3",
        )
        .bind(profile.id)
        .bind(paper.id)
        .bind(paper_type.as_str())
        .fetch_all(&mut *tx)
        .await?;

        // Autosaved answers count too.
        let answered = stored
            .iter()
            .filter(|(qid, answer)| in_session.contains_key(qid) && answer.as_deref().is_some_and(|a| !a.trim().is_empty()))
            .count();

        let score: Decimal = stored
            .iter()
            .filter_map(|(qid, answer)| {
                let q = in_session.get(qid)?;
                let part: Part = q.part.parse().ok()?;
                let correct = q.correct_answer.as_deref()?;
                (is_objective(part) && answers_match(correct, answer.as_deref()?)).then_some(q.marks)
            })
            .sum();

        let completed_at: chrono::DateTime<chrono::Utc> = sqlx::query_scalar(
            "UPDATE exam_sessions SET completed_at = NOW(), score = $2 WHERE id = $1 RETURNING completed_at",
        )
        .bind(session.id)
        .bind(score)
        .fetch_one(&mut *tx)
        .await?;

        let slot_consumed = SlotService::consume(&mut *tx, profile.id, paper_type).await?;
        tx.commit().await?;

        if payload.terminated {
            tracing::warn!(
                session_id = session.id,
                candidate_id = profile.id,
                reason = payload.termination_reason.as_deref().unwrap_or("unspecified"),
                "exam terminated by client"
            );
        }
        tracing::info!(
            session_id = session.id,
            candidate_id = profile.id,
            paper_type = %paper_type,
            answered,
            score = %score,
            slot_consumed,
            "exam submitted"
        );

        Ok(SubmitResult {
            session_id: session.id,
            paper_type,
            answered,
            total_questions: session.total_questions,
            objective_score: score,
            slot_consumed,
            completed_at,
        })
    }

    pub async fn status(&self, user_id: i64) -> Result<ExamStatus> {
        let profile = self.candidates.get_by_user(user_id).await?;
        let trade = self.trades.find(profile.trade_id).await?;
        let active = self.papers.active_papers(profile.trade_id).await?;

        let session = match self.open_session(profile.id, None).await? {
            Some(s) => {
                let paper = self.papers.paper_by_id(s.paper_id).await?;
                let paper_type = paper.paper_type().unwrap_or(PaperType::Primary);
                let answered: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM candidate_answers ca
                    JOIN exam_questions eq ON eq.question_id = ca.question_id AND eq.session_id = $1
                    WHERE ca.candidate_id = $2 AND ca.paper_id = $3 AND ca.exam_type = $4
                      AND ca.answer IS NOT NULL AND ca.answer <> ''
                    "#,
                )
                .bind(s.id)
                .bind(profile.id)
                .bind(paper.id)
                .bind(paper_type.as_str())
                .fetch_one(&self.pool)
                .await?;
                let duration = self.session_duration(&s, profile.trade_id, paper_type, &paper).await?;
                Some(SessionProgress {
                    session_id: s.id,
                    paper_type,
                    answered,
                    total_questions: s.total_questions,
                    remaining_seconds: s.remaining_seconds(duration, now()),
                })
            }
            None => None,
        };

        Ok(ExamStatus {
            slot_status: profile.slot_status(),
            can_start_exam: profile.can_start_exam(trade.as_ref(), active),
            next_exam_type: trade.as_ref().map(|t| profile.next_exam_type(t)),
            is_primary_completed: profile.is_primary_completed,
            is_secondary_completed: profile.is_secondary_completed,
            session,
        })
    }
}

async fn upsert_answer<'e, E>(
    executor: E,
    candidate_id: i64,
    paper_id: i64,
    question_id: i64,
    paper_type: PaperType,
    answer: Option<&str>,
) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let answer = answer.map(str::trim).filter(|a| !a.is_empty());
    sqlx::query(
        r#"
        INSERT INTO candidate_answers (candidate_id, paper_id, question_id, exam_type, answer, submitted_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (candidate_id, paper_id, question_id, exam_type)
        DO UPDATE SET answer = EXCLUDED.answer, submitted_at = NOW()
        "#,
    )
    .bind(candidate_id)
    .bind(paper_id)
    .bind(question_id)
    .bind(paper_type.as_str())
    .bind(answer)
    .execute(executor)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::tests::{candidate, trade};

    const BOTH: ActivePapers = ActivePapers { primary: true, secondary: true };

    #[test]
    fn objective_answers_compare_loosely() {
        assert!(answers_match("New Delhi", "  new   delhi "));
        assert!(!answers_match("True", ""));
        assert!(!answers_match("4", "5"));
        assert!(is_objective(Part::F));
        assert!(!is_objective(Part::E));
    }

    #[test]
    fn primary_preferred_while_open() {
        let occ = trade("OCC", "OCC");
        let mut c = candidate();
        assert_eq!(pick_paper_type(&c, &occ, BOTH), Some(PaperType::Primary));
        c.is_primary_completed = true;
        assert_eq!(pick_paper_type(&c, &occ, BOTH), Some(PaperType::Secondary));
        c.is_secondary_completed = true;
        assert_eq!(pick_paper_type(&c, &occ, BOTH), None);
    }

    #[test]
    fn trade_override_wins_over_session_duration() {
        let session = ExamSession {
            id: 1,
            paper_id: 2,
            candidate_id: 1,
            trade_id: Some(3),
            question_set: "A".into(),
            started_at: None,
            completed_at: None,
            duration_minutes: Some(90),
            total_questions: 43,
            score: None,
        };
        let paper = QuestionPaper {
            id: 2,
            paper_type: "PRIMARY".into(),
            is_active: true,
            exam_duration_minutes: 180,
        };
        assert_eq!(ExamService::effective_duration(&session, Some(45), &paper), 45);
        assert_eq!(ExamService::effective_duration(&session, None, &paper), 90);
        let unset = ExamSession { duration_minutes: None, ..session };
        assert_eq!(ExamService::effective_duration(&unset, None, &paper), 180);
    }

    #[test]
    fn bypass_candidate_is_served_secondary() {
        let occ = trade("OCC", "OCC");
        let mut c = candidate();
        c.primary_bypass_allowed = true;
        c.has_exam_slot = true;
        c.slot_assigned_at = Some(chrono::Utc::now());
        assert!(c.can_start_exam(Some(&occ), BOTH));
        assert_eq!(pick_paper_type(&c, &occ, BOTH), Some(c.next_exam_type(&occ)));
        assert_eq!(pick_paper_type(&c, &occ, BOTH), Some(PaperType::Secondary));
    }

    #[test]
    fn secondary_only_trades_skip_primary() {
        let hd = trade("HD", "Hair Dresser");
        assert_eq!(pick_paper_type(&candidate(), &hd, BOTH), Some(PaperType::Secondary));
    }

    #[test]
    fn pending_primary_blocks_secondary_only_activation() {
        let occ = trade("OCC", "OCC");
        let only_secondary = ActivePapers { primary: false, secondary: true };
        assert_eq!(pick_paper_type(&candidate(), &occ, only_secondary), None);
    }
}
