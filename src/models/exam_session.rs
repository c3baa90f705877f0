use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExamSession {
    pub id: i64,
    pub paper_id: i64,
    pub candidate_id: i64,
    pub trade_id: Option<i64>,
    pub question_set: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub total_questions: i32,
    pub score: Option<Decimal>,
}

impl ExamSession {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Whole seconds left; zero once the session is over or never started.
    pub fn remaining_seconds(&self, duration_minutes: i32, now: DateTime<Utc>) -> i64 {
        if self.is_completed() {
            return 0;
        }
        let Some(started) = self.started_at else {
            return i64::from(duration_minutes) * 60;
        };
        let ends = started + Duration::minutes(i64::from(duration_minutes));
        (ends - now).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(started_at: Option<DateTime<Utc>>) -> ExamSession {
        ExamSession {
            id: 1,
            paper_id: 1,
            candidate_id: 1,
            trade_id: None,
            question_set: "A".into(),
            started_at,
            completed_at: None,
            duration_minutes: Some(180),
            total_questions: 43,
            score: None,
        }
    }

    #[test]
    fn remaining_time_counts_down_and_floors_at_zero() {
        let start = Utc::now();
        let s = session(Some(start));
        assert_eq!(s.remaining_seconds(60, start + Duration::minutes(15)), 45 * 60);
        assert_eq!(s.remaining_seconds(60, start + Duration::minutes(90)), 0);
        assert_eq!(session(None).remaining_seconds(10, start), 600);
    }
}
