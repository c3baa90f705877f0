use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub part: String,
    pub marks: Decimal,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_answer: Option<String>,
    pub trade_id: Option<i64>,
    pub paper_type: String,
    pub question_set: String,
    pub is_common: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub const QUESTION_COLUMNS: &str = "id, text, part, marks, option_a, option_b, option_c, option_d, correct_answer, \
    trade_id, paper_type, question_set, is_common, is_active, created_at";

impl Question {
    pub fn part(&self) -> Option<Part> {
        self.part.parse().ok()
    }

    pub fn options(&self) -> Vec<&str> {
        [&self.option_a, &self.option_b, &self.option_c, &self.option_d]
            .into_iter()
            .filter_map(|o| o.as_deref())
            .collect()
    }
}

/// Insertable question, produced by manual entry and by the importers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub text: String,
    pub part: Part,
    pub marks: Decimal,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub option_c: Option<String>,
    pub option_d: Option<String>,
    pub correct_answer: Option<String>,
    pub trade_id: Option<i64>,
    pub paper_type: PaperType,
    pub question_set: QuestionSet,
    pub is_common: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Part {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Part {
    pub const ALL: [Part; 6] = [Part::A, Part::B, Part::C, Part::D, Part::E, Part::F];

    pub fn as_str(self) -> &'static str {
        match self {
            Part::A => "A",
            Part::B => "B",
            Part::C => "C",
            Part::D => "D",
            Part::E => "E",
            Part::F => "F",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Part::A => "Part A - MCQ (Single Choice)",
            Part::B => "Part B - MCQ (Multiple Choice)",
            Part::C => "Part C - Short answer (20-30 words)",
            Part::D => "Part D - Fill in the blanks",
            Part::E => "Part E - Long answer (100-120 words)",
            Part::F => "Part F - True/False",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Part {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Part::A),
            "B" => Ok(Part::B),
            "C" => Ok(Part::C),
            "D" => Ok(Part::D),
            "E" => Ok(Part::E),
            "F" => Ok(Part::F),
            other => Err(format!("Invalid part '{}'. Must be one of: A, B, C, D, E, F", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaperType {
    Primary,
    Secondary,
}

impl PaperType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaperType::Primary => "PRIMARY",
            PaperType::Secondary => "SECONDARY",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PaperType::Primary => "Primary",
            PaperType::Secondary => "Secondary",
        }
    }
}

impl fmt::Display for PaperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PRIMARY" => Ok(PaperType::Primary),
            "SECONDARY" => Ok(PaperType::Secondary),
            other => Err(format!("Invalid paper_type '{}'. Must be PRIMARY or SECONDARY", other)),
        }
    }
}

/// Rotation label of a question pool, a single letter A-Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QuestionSet(char);

impl QuestionSet {
    pub const DEFAULT: QuestionSet = QuestionSet('A');

    pub fn new(label: char) -> Option<Self> {
        label.is_ascii_uppercase().then_some(QuestionSet(label))
    }

    pub fn label(self) -> char {
        self.0
    }

    pub fn as_string(self) -> String {
        self.0.to_string()
    }
}

impl Default for QuestionSet {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for QuestionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QuestionSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                QuestionSet::new(c).ok_or_else(|| format!("Invalid question_set '{}'. Must be A-Z", s))
            }
            _ => Err(format!("Invalid question_set '{}'. Must be A-Z", s)),
        }
    }
}

impl TryFrom<String> for QuestionSet {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuestionSet> for String {
    fn from(value: QuestionSet) -> Self {
        value.as_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_set_accepts_single_uppercase_letters_only() {
        assert_eq!("C".parse::<QuestionSet>().unwrap().label(), 'C');
        assert!("c".parse::<QuestionSet>().is_err());
        assert!("AB".parse::<QuestionSet>().is_err());
        assert!("".parse::<QuestionSet>().is_err());
        assert!("1".parse::<QuestionSet>().is_err());
    }

    #[test]
    fn paper_type_round_trips_through_serde() {
        let json = serde_json::to_string(&PaperType::Secondary).unwrap();
        assert_eq!(json, "\"SECONDARY\"");
        let back: PaperType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PaperType::Secondary);
    }
}
