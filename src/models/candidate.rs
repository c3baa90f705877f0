use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::models::question::PaperType;
use crate::models::trade::Trade;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateProfile {
    pub id: i64,
    pub user_id: i64,

    pub army_no: String,
    pub rank: String,
    pub name: String,
    pub father_name: String,
    pub unit: Option<String>,
    pub brigade: Option<String>,
    pub corps: Option<String>,
    pub command: Option<String>,
    pub trade_id: Option<i64>,
    pub dob: String,
    pub doe: NaiveDate,
    pub aadhar_number: String,
    pub mobile_no: Option<String>,
    pub apaar_id: String,

    pub nsqf_level: String,
    pub exam_center: Option<String>,
    pub training_center: Option<String>,
    pub state: String,
    pub district: String,
    pub primary_qualification: Option<String>,
    pub primary_duration: Option<String>,
    pub primary_credits: Option<String>,
    pub secondary_qualification: Option<String>,
    pub secondary_duration: Option<String>,
    pub secondary_credits: Option<String>,

    pub primary_viva_marks: Option<i32>,
    pub primary_practical_marks: Option<i32>,
    pub secondary_viva_marks: Option<i32>,
    pub secondary_practical_marks: Option<i32>,

    pub is_primary_completed: bool,
    pub is_secondary_completed: bool,
    pub primary_bypass_allowed: bool,

    pub has_exam_slot: bool,
    pub slot_assigned_at: Option<DateTime<Utc>>,
    pub slot_attempting_at: Option<DateTime<Utc>>,
    pub slot_consumed_at: Option<DateTime<Utc>>,
    pub slot_assigned_by: Option<i64>,

    pub created_at: DateTime<Utc>,
}

pub const CANDIDATE_COLUMNS: &str = "id, user_id, army_no, rank, name, father_name, unit, brigade, corps, command, \
    trade_id, dob, doe, aadhar_number, mobile_no, apaar_id, nsqf_level, exam_center, training_center, state, district, \
    primary_qualification, primary_duration, primary_credits, secondary_qualification, secondary_duration, secondary_credits, \
    primary_viva_marks, primary_practical_marks, secondary_viva_marks, secondary_practical_marks, \
    is_primary_completed, is_secondary_completed, primary_bypass_allowed, \
    has_exam_slot, slot_assigned_at, slot_attempting_at, slot_consumed_at, slot_assigned_by, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    NoSlot,
    Available(DateTime<Utc>),
    Attempting(DateTime<Utc>),
    Consumed(DateTime<Utc>),
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FMT: &str = "%Y-%m-%d %H:%M";
        match self {
            SlotState::NoSlot => f.write_str("No Slot"),
            SlotState::Available(at) => write!(f, "Available (assigned {})", at.format(FMT)),
            SlotState::Attempting(at) => write!(f, "Attempting since {}", at.format(FMT)),
            SlotState::Consumed(at) => write!(f, "Consumed on {}", at.format(FMT)),
        }
    }
}

/// Whether each paper type has an active activation for the candidate's trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivePapers {
    pub primary: bool,
    pub secondary: bool,
}

impl ActivePapers {
    pub fn is_active(&self, paper_type: PaperType) -> bool {
        match paper_type {
            PaperType::Primary => self.primary,
            PaperType::Secondary => self.secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarksLimits {
    pub practical: i32,
    pub viva: i32,
}

const DEFAULT_LIMITS: MarksLimits = MarksLimits { practical: 30, viva: 10 };
const REDUCED_LIMITS: MarksLimits = MarksLimits { practical: 20, viva: 5 };

/// Limits for one paper type of a trade; `None` means the paper carries no marks.
pub fn marks_limits(trade: &Trade, paper_type: PaperType) -> Option<MarksLimits> {
    let key = trade.normalized_key();
    match (paper_type, key.as_str()) {
        (PaperType::Primary, "OCC" | "DMV") => Some(REDUCED_LIMITS),
        (PaperType::Primary, "HAIR DRESSER" | "SP STAFF") => None,
        _ => Some(DEFAULT_LIMITS),
    }
}

/// Marks entry for one paper type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MarksEntry {
    pub practical: Option<i32>,
    pub viva: Option<i32>,
}

impl CandidateProfile {
    pub fn slot_state(&self) -> SlotState {
        if let Some(at) = self.slot_consumed_at {
            return SlotState::Consumed(at);
        }
        if let Some(at) = self.slot_attempting_at {
            return SlotState::Attempting(at);
        }
        match (self.has_exam_slot, self.slot_assigned_at) {
            (true, Some(at)) => SlotState::Available(at),
            _ => SlotState::NoSlot,
        }
    }

    pub fn slot_status(&self) -> String {
        self.slot_state().to_string()
    }

    pub fn is_completed(&self, paper_type: PaperType) -> bool {
        match paper_type {
            PaperType::Primary => self.is_primary_completed,
            PaperType::Secondary => self.is_secondary_completed,
        }
    }

    pub fn next_exam_type(&self, trade: &Trade) -> PaperType {
        if !trade.has_primary_exam() || self.is_primary_completed || self.primary_bypass_allowed {
            PaperType::Secondary
        } else {
            PaperType::Primary
        }
    }

    /// Completion and ordering rules for attempting `paper_type`.
    pub fn may_attempt(&self, paper_type: PaperType, trade: &Trade) -> Result<(), String> {
        if self.is_completed(paper_type) {
            return Err(format!("{} exam already completed.", paper_type.display_name()));
        }
        if paper_type == PaperType::Secondary
            && trade.has_primary_exam()
            && !self.is_primary_completed
            && !self.primary_bypass_allowed
        {
            return Err("Primary exam not completed. Cannot start secondary exam.".to_string());
        }
        Ok(())
    }

    /// Guards for handing out a new slot. Returns the paper type the slot is for.
    pub fn check_assign(&self, trade: Option<&Trade>, active: ActivePapers) -> Result<PaperType, String> {
        if self.has_exam_slot && self.slot_consumed_at.is_none() {
            return Err("Candidate already has an active exam slot.".to_string());
        }
        let trade = trade.ok_or_else(|| "Candidate has no trade assigned.".to_string())?;
        let exam_type = self.next_exam_type(trade);
        if !active.is_active(exam_type) {
            return Err(format!(
                "No active {} paper for trade {}.",
                exam_type.display_name(),
                trade.code
            ));
        }
        self.may_attempt(exam_type, trade)?;
        Ok(exam_type)
    }

    pub fn can_start_exam(&self, trade: Option<&Trade>, active: ActivePapers) -> bool {
        if !self.has_exam_slot || self.slot_consumed_at.is_some() {
            return false;
        }
        let Some(trade) = trade else {
            return false;
        };
        let exam_type = self.next_exam_type(trade);
        active.is_active(exam_type) && self.may_attempt(exam_type, trade).is_ok()
    }

    pub fn validate_marks(&self, trade: &Trade, paper_type: PaperType, entry: MarksEntry) -> Result<(), String> {
        let label = paper_type.display_name();
        for (kind, value) in [("practical", entry.practical), ("viva", entry.viva)] {
            if matches!(value, Some(v) if v < 0) {
                return Err(format!("{} {} marks cannot be negative.", label, kind));
            }
        }
        let Some(limits) = marks_limits(trade, paper_type) else {
            return Ok(());
        };
        if let Some(v) = entry.practical.filter(|v| *v > limits.practical) {
            return Err(format!(
                "{} practical marks cannot exceed {} for {} trade (got {}).",
                label, limits.practical, trade.code, v
            ));
        }
        if let Some(v) = entry.viva.filter(|v| *v > limits.viva) {
            return Err(format!(
                "{} viva marks cannot exceed {} for {} trade (got {}).",
                label, limits.viva, trade.code, v
            ));
        }
        Ok(())
    }

    /// Applies a validated marks entry and recomputes completion. Primary
    /// completion is never unset here since it may come from a submitted exam.
    pub fn apply_marks(&mut self, paper_type: PaperType, entry: MarksEntry) {
        match paper_type {
            PaperType::Primary => {
                self.primary_practical_marks = entry.practical;
                self.primary_viva_marks = entry.viva;
                if entry.practical.is_some() && entry.viva.is_some() {
                    self.is_primary_completed = true;
                }
            }
            PaperType::Secondary => {
                self.secondary_practical_marks = entry.practical;
                self.secondary_viva_marks = entry.viva;
                self.is_secondary_completed = entry.practical.is_some() && entry.viva.is_some();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    pub(crate) fn trade(code: &str, name: &str) -> Trade {
        Trade {
            id: 3,
            code: code.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    pub(crate) fn candidate() -> CandidateProfile {
        CandidateProfile {
            id: 1,
            user_id: 10,
            army_no: "JC123456".into(),
            rank: "Hav".into(),
            name: "Test Candidate".into(),
            father_name: "Father".into(),
            unit: None,
            brigade: None,
            corps: None,
            command: None,
            trade_id: Some(3),
            dob: "1990-01-01".into(),
            doe: NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(),
            aadhar_number: "123456789012".into(),
            mobile_no: Some("9876543210".into()),
            apaar_id: "210987654321".into(),
            nsqf_level: "4".into(),
            exam_center: Some("Center 1".into()),
            training_center: None,
            state: "Delhi".into(),
            district: "New Delhi".into(),
            primary_qualification: None,
            primary_duration: None,
            primary_credits: None,
            secondary_qualification: None,
            secondary_duration: None,
            secondary_credits: None,
            primary_viva_marks: None,
            primary_practical_marks: None,
            secondary_viva_marks: None,
            secondary_practical_marks: None,
            is_primary_completed: false,
            is_secondary_completed: false,
            primary_bypass_allowed: false,
            has_exam_slot: false,
            slot_assigned_at: None,
            slot_attempting_at: None,
            slot_consumed_at: None,
            slot_assigned_by: None,
            created_at: Utc::now(),
        }
    }

    const BOTH: ActivePapers = ActivePapers { primary: true, secondary: true };

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn slot_status_strings() {
        let mut c = candidate();
        assert_eq!(c.slot_status(), "No Slot");
        c.has_exam_slot = true;
        c.slot_assigned_at = Some(at(0));
        assert_eq!(c.slot_status(), "Available (assigned 2026-03-01 09:00)");
        c.slot_attempting_at = Some(at(5));
        assert_eq!(c.slot_status(), "Attempting since 2026-03-01 09:05");
        c.has_exam_slot = false;
        c.slot_attempting_at = None;
        c.slot_consumed_at = Some(at(60));
        assert_eq!(c.slot_status(), "Consumed on 2026-03-01 10:00");
    }

    #[test]
    fn next_exam_type_follows_completion_and_bypass() {
        let occ = trade("OCC", "OCC");
        let mut c = candidate();
        assert_eq!(c.next_exam_type(&occ), PaperType::Primary);
        c.primary_bypass_allowed = true;
        assert_eq!(c.next_exam_type(&occ), PaperType::Secondary);
        c.primary_bypass_allowed = false;
        c.is_primary_completed = true;
        assert_eq!(c.next_exam_type(&occ), PaperType::Secondary);
        assert_eq!(candidate().next_exam_type(&trade("MUS", "Musician")), PaperType::Secondary);
    }

    #[test]
    fn can_start_requires_slot_trade_and_activation() {
        let occ = trade("OCC", "OCC");
        let mut c = candidate();
        assert!(!c.can_start_exam(Some(&occ), BOTH));
        c.has_exam_slot = true;
        c.slot_assigned_at = Some(at(0));
        assert!(c.can_start_exam(Some(&occ), BOTH));
        assert!(!c.can_start_exam(None, BOTH));
        assert!(!c.can_start_exam(Some(&occ), ActivePapers { primary: false, secondary: true }));
    }

    #[test]
    fn assign_refuses_completed_secondary() {
        let occ = trade("OCC", "OCC");
        let mut c = candidate();
        c.is_primary_completed = true;
        c.is_secondary_completed = true;
        let err = c.check_assign(Some(&occ), BOTH).unwrap_err();
        assert!(err.contains("already completed"));
    }

    #[test]
    fn secondary_blocked_while_primary_pending() {
        let c = candidate();
        assert!(c.may_attempt(PaperType::Secondary, &trade("OCC", "OCC")).is_err());
        assert!(c.may_attempt(PaperType::Secondary, &trade("HD", "Hair Dresser")).is_ok());
    }

    #[test]
    fn marks_limits_per_trade() {
        let c = candidate();
        let occ = trade("OCC", "OCC");
        let entry = MarksEntry { practical: Some(25), viva: Some(5) };
        assert!(c.validate_marks(&occ, PaperType::Primary, entry).is_err());
        assert!(c.validate_marks(&occ, PaperType::Secondary, entry).is_ok());
        let negative = MarksEntry { practical: Some(-1), viva: None };
        assert!(c.validate_marks(&occ, PaperType::Secondary, negative).is_err());
        let sp = trade("SPS", "SP Staff");
        let big = MarksEntry { practical: Some(99), viva: Some(99) };
        assert!(c.validate_marks(&sp, PaperType::Primary, big).is_ok());
    }

    #[test]
    fn apply_marks_keeps_primary_completion_from_exam() {
        let mut c = candidate();
        c.is_primary_completed = true;
        c.apply_marks(PaperType::Primary, MarksEntry { practical: Some(10), viva: None });
        assert!(c.is_primary_completed);
        c.apply_marks(PaperType::Secondary, MarksEntry { practical: Some(10), viva: Some(4) });
        assert!(c.is_secondary_completed);
        c.apply_marks(PaperType::Secondary, MarksEntry { practical: None, viva: Some(4) });
        assert!(!c.is_secondary_completed);
    }

    /// Mirrors the UPDATE statements issued by the slot service.
    #[derive(Debug, Clone)]
    enum Op {
        Assign,
        Start,
        Consume,
        Reset,
        Reassign,
    }

    fn apply(c: &mut CandidateProfile, op: &Op, trade: &Trade, now: DateTime<Utc>) {
        match op {
            Op::Assign => {
                if c.check_assign(Some(trade), BOTH).is_ok() {
                    c.has_exam_slot = true;
                    c.slot_assigned_at = Some(now);
                    c.slot_attempting_at = None;
                    c.slot_consumed_at = None;
                }
            }
            Op::Start => {
                if c.has_exam_slot && c.slot_attempting_at.is_none() {
                    c.slot_attempting_at = Some(now);
                }
            }
            Op::Consume => {
                if c.has_exam_slot {
                    match c.next_exam_type(trade) {
                        PaperType::Primary => c.is_primary_completed = true,
                        PaperType::Secondary => c.is_secondary_completed = true,
                    }
                    c.slot_consumed_at = Some(now);
                    c.has_exam_slot = false;
                    c.slot_attempting_at = None;
                }
            }
            Op::Reset => {
                c.has_exam_slot = false;
                c.slot_assigned_at = None;
                c.slot_attempting_at = None;
                c.slot_consumed_at = None;
            }
            Op::Reassign => {
                apply(c, &Op::Reset, trade, now);
                apply(c, &Op::Assign, trade, now);
            }
        }
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Assign),
            Just(Op::Start),
            Just(Op::Consume),
            Just(Op::Reset),
            Just(Op::Reassign),
        ]
    }

    proptest! {
        #[test]
        fn consumed_implies_assigned_earlier(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let occ = trade("OCC", "OCC");
            let mut c = candidate();
            for (i, op) in ops.iter().enumerate() {
                apply(&mut c, op, &occ, at(i as i64));
                if let Some(consumed) = c.slot_consumed_at {
                    let assigned = c.slot_assigned_at;
                    prop_assert!(assigned.is_some());
                    prop_assert!(assigned.unwrap() <= consumed);
                }
            }
        }

        #[test]
        fn reassign_after_consume_reopens_next_paper(gap in 1i64..600) {
            let occ = trade("OCC", "OCC");
            let mut c = candidate();
            apply(&mut c, &Op::Assign, &occ, at(0));
            apply(&mut c, &Op::Start, &occ, at(1));
            apply(&mut c, &Op::Consume, &occ, at(2));
            prop_assert!(!c.can_start_exam(Some(&occ), BOTH));

            apply(&mut c, &Op::Reassign, &occ, at(2 + gap));
            prop_assert!(c.slot_consumed_at.is_none());
            prop_assert!(c.slot_attempting_at.is_none());
            prop_assert!(c.can_start_exam(Some(&occ), BOTH));
        }
    }
}
