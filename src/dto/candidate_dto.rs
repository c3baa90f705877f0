use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::models::candidate::{CandidateProfile, MarksEntry};
use crate::models::question::PaperType;
use crate::utils::validation::{validate_aadhaar, validate_apaar, validate_mobile};

fn trim_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterCandidatePayload {
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    #[validate(length(min = 6))]
    pub password: String,

    #[validate(length(min = 1, max = 50))]
    pub army_no: String,
    #[validate(length(min = 1, max = 50))]
    pub rank: String,
    #[validate(length(min = 1, max = 150))]
    pub name: String,
    #[validate(length(min = 1, max = 150))]
    pub father_name: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub brigade: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub corps: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub command: Option<String>,
    pub trade_id: i64,
    #[validate(length(min = 1))]
    pub dob: String,
    pub doe: NaiveDate,
    pub aadhar_number: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub mobile_no: Option<String>,
    pub apaar_id: String,

    #[serde(default)]
    pub nsqf_level: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub exam_center: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub training_center: Option<String>,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub district: String,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub primary_qualification: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub primary_duration: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub primary_credits: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub secondary_qualification: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub secondary_duration: Option<String>,
    #[serde(default, deserialize_with = "trim_optional_string")]
    pub secondary_credits: Option<String>,
}

impl RegisterCandidatePayload {
    /// Field rules plus the fixed-width digit identifiers.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(e) => e,
        };
        if let Err(e) = validate_aadhaar(self.aadhar_number.trim()) {
            errors.add("aadhar_number", e);
        }
        if let Err(e) = validate_apaar(self.apaar_id.trim()) {
            errors.add("apaar_id", e);
        }
        if let Some(mobile) = &self.mobile_no {
            if let Err(e) = validate_mobile(mobile) {
                errors.add("mobile_no", e);
            }
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Listing row: a profile joined with its trade and slot status.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub id: i64,
    pub army_no: String,
    pub rank: String,
    pub name: String,
    pub trade_code: Option<String>,
    pub exam_center: Option<String>,
    pub is_primary_completed: bool,
    pub is_secondary_completed: bool,
    pub primary_bypass_allowed: bool,
    pub has_exam_slot: bool,
    pub slot_status: String,
    pub slot_assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CandidateSummary {
    pub fn new(profile: &CandidateProfile, trade_code: Option<String>) -> Self {
        Self {
            id: profile.id,
            army_no: profile.army_no.clone(),
            rank: profile.rank.clone(),
            name: profile.name.clone(),
            trade_code,
            exam_center: profile.exam_center.clone(),
            is_primary_completed: profile.is_primary_completed,
            is_secondary_completed: profile.is_secondary_completed,
            primary_bypass_allowed: profile.primary_bypass_allowed,
            has_exam_slot: profile.has_exam_slot,
            slot_status: profile.slot_status(),
            slot_assigned_at: profile.slot_assigned_at,
            created_at: profile.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarksPayload {
    pub paper_type: PaperType,
    #[serde(flatten)]
    pub marks: MarksEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BypassPayload {
    pub allowed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateFilter {
    pub trade_id: Option<i64>,
    pub has_slot: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkSlotPayload {
    pub candidate_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkSlotResult {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BulkSlotFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSlotFailure {
    pub candidate_id: i64,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RegisterCandidatePayload {
        serde_json::from_value(serde_json::json!({
            "username": "jc123456",
            "password": "secret1",
            "army_no": "JC123456",
            "rank": "Hav",
            "name": "Ram Singh",
            "father_name": "Shyam Singh",
            "unit": "  ",
            "trade_id": 1,
            "dob": "1990-01-01",
            "doe": "2010-05-01",
            "aadhar_number": "123456789012",
            "mobile_no": "9876543210",
            "apaar_id": "210987654321",
            "state": "Punjab",
            "district": "Amritsar"
        }))
        .unwrap()
    }

    #[test]
    fn blank_optional_fields_become_none() {
        assert_eq!(payload().unit, None);
    }

    #[test]
    fn identity_digit_rules_are_enforced() {
        assert!(payload().validate_all().is_ok());
        let mut bad = payload();
        bad.aadhar_number = "1234".into();
        bad.mobile_no = Some("98765".into());
        let errors = bad.validate_all().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("aadhar_number"));
        assert!(fields.contains_key("mobile_no"));
        assert!(!fields.contains_key("apaar_id"));
    }
}
