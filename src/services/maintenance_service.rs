//! Bulk data maintenance shared by the admin API and the `exam-admin` CLI.

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;

use crate::dto::admin_dto::ClearSessionsPayload;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupLevel {
    Questions,
    ExamData,
    Candidates,
    Everything,
}

impl CleanupLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupLevel::Questions => "questions",
            CleanupLevel::ExamData => "exam-data",
            CleanupLevel::Candidates => "candidates",
            CleanupLevel::Everything => "everything",
        }
    }
}

impl fmt::Display for CleanupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "questions" => Ok(CleanupLevel::Questions),
            "exam-data" => Ok(CleanupLevel::ExamData),
            "candidates" => Ok(CleanupLevel::Candidates),
            "everything" | "all" => Ok(CleanupLevel::Everything),
            other => Err(Error::BadRequest(format!(
                "Unknown cleanup level '{}'. Use questions, exam-data, candidates or everything",
                other
            ))),
        }
    }
}

/// One statement of a cleanup, with the query that counts what it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStep {
    pub target: &'static str,
    pub count_sql: &'static str,
    pub action_sql: &'static str,
    /// `action_sql` takes the default exam duration as `$1`.
    pub binds_duration: bool,
}

const fn step(target: &'static str, count_sql: &'static str, action_sql: &'static str) -> CleanupStep {
    CleanupStep {
        target,
        count_sql,
        action_sql,
        binds_duration: false,
    }
}

const ANSWERS: CleanupStep = step(
    "candidate_answers",
    "SELECT COUNT(*) FROM candidate_answers",
    "DELETE FROM candidate_answers",
);
const EXAM_QUESTIONS: CleanupStep = step(
    "exam_questions",
    "SELECT COUNT(*) FROM exam_questions",
    "DELETE FROM exam_questions",
);
const SESSIONS: CleanupStep = step(
    "exam_sessions",
    "SELECT COUNT(*) FROM exam_sessions",
    "DELETE FROM exam_sessions",
);
const QUESTIONS: CleanupStep = step("questions", "SELECT COUNT(*) FROM questions", "DELETE FROM questions");
const UPLOADS: CleanupStep = step(
    "question_uploads",
    "SELECT COUNT(*) FROM question_uploads",
    "DELETE FROM question_uploads",
);
const ACTIVATIONS: CleanupStep = step(
    "paper_activations",
    "SELECT COUNT(*) FROM paper_activations",
    "DELETE FROM paper_activations",
);
const SLOT_RESET: CleanupStep = step(
    "candidate_slots",
    "SELECT COUNT(*) FROM candidate_profiles \
     WHERE has_exam_slot OR slot_assigned_at IS NOT NULL OR is_primary_completed OR is_secondary_completed",
    "UPDATE candidate_profiles \
     SET has_exam_slot = FALSE, slot_assigned_at = NULL, slot_attempting_at = NULL, slot_consumed_at = NULL, \
         slot_assigned_by = NULL, is_primary_completed = FALSE, is_secondary_completed = FALSE \
     WHERE has_exam_slot OR slot_assigned_at IS NOT NULL OR is_primary_completed OR is_secondary_completed",
);
const PROFILES: CleanupStep = step(
    "candidate_profiles",
    "SELECT COUNT(*) FROM candidate_profiles",
    "DELETE FROM candidate_profiles",
);
const CANDIDATE_USERS: CleanupStep = step(
    "candidate_users",
    "SELECT COUNT(*) FROM users WHERE role = 'CANDIDATE'",
    "DELETE FROM users WHERE role = 'CANDIDATE'",
);
const TRADES: CleanupStep = step("trades", "SELECT COUNT(*) FROM trades", "DELETE FROM trades");
const AUDIT: CleanupStep = step("audit_logs", "SELECT COUNT(*) FROM audit_logs", "DELETE FROM audit_logs");
const PAPERS_RESEED: CleanupStep = CleanupStep {
    target: "question_papers",
    count_sql: "SELECT COUNT(*) FROM question_papers",
    action_sql: "UPDATE question_papers SET is_active = TRUE, exam_duration_minutes = $1",
    binds_duration: true,
};

/// Statements for `level`, children before parents.
pub fn cleanup_plan(level: CleanupLevel) -> Vec<CleanupStep> {
    match level {
        CleanupLevel::Questions => vec![ANSWERS, EXAM_QUESTIONS, SESSIONS, QUESTIONS, UPLOADS, ACTIVATIONS],
        CleanupLevel::ExamData => vec![
            ANSWERS,
            EXAM_QUESTIONS,
            SESSIONS,
            QUESTIONS,
            UPLOADS,
            ACTIVATIONS,
            SLOT_RESET,
        ],
        CleanupLevel::Candidates => vec![ANSWERS, EXAM_QUESTIONS, SESSIONS, PROFILES, CANDIDATE_USERS],
        CleanupLevel::Everything => vec![
            ANSWERS,
            EXAM_QUESTIONS,
            SESSIONS,
            QUESTIONS,
            UPLOADS,
            ACTIVATIONS,
            PROFILES,
            CANDIDATE_USERS,
            TRADES,
            AUDIT,
            PAPERS_RESEED,
        ],
    }
}

const EXAM_RESULTS_PLAN: [CleanupStep; 4] = [ANSWERS, EXAM_QUESTIONS, SESSIONS, SLOT_RESET];

#[derive(Debug, Clone, Serialize)]
pub struct CleanupCount {
    pub target: &'static str,
    pub rows: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub level: String,
    pub dry_run: bool,
    pub counts: Vec<CleanupCount>,
}

impl CleanupReport {
    pub fn total(&self) -> i64 {
        self.counts.iter().map(|c| c.rows).sum()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoleCount {
    pub role: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuestionCount {
    pub paper_type: String,
    pub part: String,
    pub question_set: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataStats {
    pub users: Vec<RoleCount>,
    pub trades: i64,
    pub candidates: i64,
    pub candidates_with_slot: i64,
    pub questions: Vec<QuestionCount>,
    pub sessions: i64,
    pub sessions_completed: i64,
    pub answers: i64,
    pub uploads: i64,
}

#[derive(Clone)]
pub struct MaintenanceService {
    pool: PgPool,
    default_duration_minutes: i32,
}

impl MaintenanceService {
    /// `default_duration_minutes` is what papers are reset to by the
    /// `everything` level.
    pub fn new(pool: PgPool, default_duration_minutes: i32) -> Self {
        Self {
            pool,
            default_duration_minutes,
        }
    }

    async fn run(&self, label: &str, steps: &[CleanupStep], dry_run: bool) -> Result<CleanupReport> {
        let mut counts = Vec::with_capacity(steps.len());
        if dry_run {
            for s in steps {
                let rows: i64 = sqlx::query_scalar(s.count_sql).fetch_one(&self.pool).await?;
                counts.push(CleanupCount { target: s.target, rows });
            }
        } else {
            let mut tx = self.pool.begin().await?;
            for s in steps {
                let mut query = sqlx::query(s.action_sql);
                if s.binds_duration {
                    query = query.bind(self.default_duration_minutes);
                }
                let done = query.execute(&mut *tx).await?;
                counts.push(CleanupCount {
                    target: s.target,
                    rows: done.rows_affected() as i64,
                });
            }
            tx.commit().await?;
        }
        let report = CleanupReport {
            level: label.to_string(),
            dry_run,
            counts,
        };
        tracing::warn!(level = label, dry_run, rows = report.total(), "cleanup finished");
        Ok(report)
    }

    pub async fn cleanup(&self, level: CleanupLevel, dry_run: bool) -> Result<CleanupReport> {
        self.run(level.as_str(), &cleanup_plan(level), dry_run).await
    }

    /// Drops every answer and session and clears slots and completion flags.
    pub async fn clear_exam_results(&self, dry_run: bool) -> Result<CleanupReport> {
        self.run("exam-results", &EXAM_RESULTS_PLAN, dry_run).await
    }

    /// Removes unfinished sessions, narrowed by trade, candidate or paper type.
    /// Returns the number of sessions removed.
    pub async fn clear_incomplete_sessions(&self, filter: &ClearSessionsPayload) -> Result<u64> {
        let paper_type = filter.paper_type.map(|p| p.as_str());
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM candidate_answers ca
            USING exam_sessions s
            JOIN question_papers p ON p.id = s.paper_id
            JOIN candidate_profiles c ON c.id = s.candidate_id
            WHERE ca.candidate_id = s.candidate_id AND ca.paper_id = s.paper_id
              AND s.completed_at IS NULL
              AND ($1::BIGINT IS NULL OR c.trade_id = $1)
              AND ($2::BIGINT IS NULL OR s.candidate_id = $2)
              AND ($3::TEXT IS NULL OR p.paper_type = $3)
            "#,
        )
        .bind(filter.trade_id)
        .bind(filter.candidate_id)
        .bind(paper_type)
        .execute(&mut *tx)
        .await?;
        let done = sqlx::query(
            r#"
            DELETE FROM exam_sessions s
            USING question_papers p, candidate_profiles c
            WHERE p.id = s.paper_id AND c.id = s.candidate_id
              AND s.completed_at IS NULL
              AND ($1::BIGINT IS NULL OR c.trade_id = $1)
              AND ($2::BIGINT IS NULL OR s.candidate_id = $2)
              AND ($3::TEXT IS NULL OR p.paper_type = $3)
            "#,
        )
        .bind(filter.trade_id)
        .bind(filter.candidate_id)
        .bind(paper_type)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(
            removed = done.rows_affected(),
            trade_id = filter.trade_id,
            candidate_id = filter.candidate_id,
            paper_type,
            "incomplete sessions cleared"
        );
        Ok(done.rows_affected())
    }

    pub async fn stats(&self) -> Result<DataStats> {
        let users = sqlx::query_as::<_, RoleCount>(
            "SELECT role, COUNT(*) AS count FROM users GROUP BY role ORDER BY role",
        )
        .fetch_all(&self.pool)
        .await?;
        let questions = sqlx::query_as::<_, QuestionCount>(
            r#"
            SELECT paper_type, part, question_set, COUNT(*) AS count
            FROM questions
            GROUP BY paper_type, part, question_set
            ORDER BY paper_type, question_set, part
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let (trades, candidates, candidates_with_slot, sessions, sessions_completed, answers, uploads): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM trades),
                (SELECT COUNT(*) FROM candidate_profiles),
                (SELECT COUNT(*) FROM candidate_profiles WHERE has_exam_slot),
                (SELECT COUNT(*) FROM exam_sessions),
                (SELECT COUNT(*) FROM exam_sessions WHERE completed_at IS NOT NULL),
                (SELECT COUNT(*) FROM candidate_answers),
                (SELECT COUNT(*) FROM question_uploads)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DataStats {
            users,
            trades,
            candidates,
            candidates_with_slot,
            questions,
            sessions,
            sessions_completed,
            answers,
            uploads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(plan: &[CleanupStep], target: &str) -> usize {
        plan.iter().position(|s| s.target == target).unwrap()
    }

    #[test]
    fn levels_parse_from_cli_spellings() {
        assert_eq!("exam_data".parse::<CleanupLevel>().unwrap(), CleanupLevel::ExamData);
        assert_eq!("ALL".parse::<CleanupLevel>().unwrap(), CleanupLevel::Everything);
        assert!("nothing".parse::<CleanupLevel>().is_err());
    }

    #[test]
    fn children_are_removed_before_parents() {
        for level in [
            CleanupLevel::Questions,
            CleanupLevel::ExamData,
            CleanupLevel::Candidates,
            CleanupLevel::Everything,
        ] {
            let plan = cleanup_plan(level);
            assert!(position(&plan, "candidate_answers") < position(&plan, "exam_sessions"));
            assert!(position(&plan, "exam_questions") < position(&plan, "exam_sessions"));
            if plan.iter().any(|s| s.target == "questions") {
                assert!(position(&plan, "candidate_answers") < position(&plan, "questions"));
            }
            if plan.iter().any(|s| s.target == "candidate_profiles") {
                assert!(position(&plan, "exam_sessions") < position(&plan, "candidate_profiles"));
                assert!(position(&plan, "candidate_profiles") < position(&plan, "candidate_users"));
            }
        }
    }

    #[test]
    fn admin_accounts_are_never_targeted() {
        let plan = cleanup_plan(CleanupLevel::Everything);
        assert!(plan
            .iter()
            .filter(|s| s.action_sql.contains("FROM users"))
            .all(|s| s.action_sql.contains("role = 'CANDIDATE'")));
        assert_eq!(plan.last().map(|s| s.target), Some("question_papers"));
    }

    #[test]
    fn only_paper_reseed_takes_the_duration_parameter() {
        let plan = cleanup_plan(CleanupLevel::Everything);
        for s in &plan {
            assert_eq!(s.binds_duration, s.action_sql.contains("$1"), "{}", s.target);
        }
        let reseed: Vec<&CleanupStep> = plan.iter().filter(|s| s.binds_duration).collect();
        assert_eq!(reseed.len(), 1);
        assert!(!reseed[0].action_sql.contains("180"));
    }

    #[test]
    fn question_cleanup_keeps_candidates() {
        let plan = cleanup_plan(CleanupLevel::Questions);
        assert!(!plan.iter().any(|s| s.target.starts_with("candidate_p") || s.target == "candidate_slots"));
        assert!(cleanup_plan(CleanupLevel::ExamData).contains(&SLOT_RESET));
    }
}
