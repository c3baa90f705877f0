use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::models::question::{PaperType, Part};
use crate::models::trade::{normalize_trade_name, Trade};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionPaper {
    pub id: i64,
    pub paper_type: String,
    pub is_active: bool,
    pub exam_duration_minutes: i32,
}

impl QuestionPaper {
    pub fn paper_type(&self) -> Option<PaperType> {
        self.paper_type.parse().ok()
    }
}

/// Number of questions drawn per part.
pub type PartDistribution = BTreeMap<Part, u32>;

const COMMON: [(Part, u32); 6] = [
    (Part::A, 15),
    (Part::B, 0),
    (Part::C, 5),
    (Part::D, 10),
    (Part::E, 3),
    (Part::F, 10),
];

const EXTENDED: [(Part, u32); 6] = [
    (Part::A, 20),
    (Part::B, 0),
    (Part::C, 5),
    (Part::D, 15),
    (Part::E, 4),
    (Part::F, 10),
];

const TRADE_TABLE: [(&str, &[(Part, u32); 6]); 17] = [
    ("TTC", &COMMON),
    ("OCC", &EXTENDED),
    ("DTMN", &COMMON),
    ("EFS", &COMMON),
    ("DMV", &EXTENDED),
    ("LMN", &COMMON),
    ("CLK SD", &COMMON),
    ("STEWARD", &COMMON),
    ("WASHERMAN", &COMMON),
    ("HOUSE KEEPER", &COMMON),
    ("CHEFCOM", &COMMON),
    ("MESS KEEPER", &COMMON),
    ("SKT", &COMMON),
    ("MUSICIAN", &COMMON),
    ("ARTSN WW", &COMMON),
    ("HAIR DRESSER", &COMMON),
    ("SP STAFF", &COMMON),
];

pub fn common_distribution() -> PartDistribution {
    COMMON.into_iter().collect()
}

/// Looks a trade key up in the hard-coded table, also trying the key without spaces.
pub fn trade_distribution(key: &str) -> Option<PartDistribution> {
    let key = normalize_trade_name(key);
    let squashed = key.replace(' ', "");
    TRADE_TABLE
        .iter()
        .find(|(name, _)| *name == key || name.replace(' ', "") == squashed)
        .map(|(_, table)| table.iter().copied().collect())
}

/// SECONDARY always uses the common table; PRIMARY uses the trade's table,
/// falling back to the common one for unconfigured trades.
pub fn distribution_for(paper_type: PaperType, trade: Option<&Trade>) -> PartDistribution {
    match (paper_type, trade) {
        (PaperType::Secondary, _) | (PaperType::Primary, None) => common_distribution(),
        (PaperType::Primary, Some(trade)) => trade
            .lookup_keys()
            .iter()
            .find_map(|key| trade_distribution(key))
            .unwrap_or_else(common_distribution),
    }
}

pub fn total_questions(dist: &PartDistribution) -> u32 {
    dist.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(code: &str, name: &str) -> Trade {
        Trade {
            id: 7,
            code: code.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn occ_primary_uses_extended_table() {
        let dist = distribution_for(PaperType::Primary, Some(&trade("OCC", "OCC")));
        assert_eq!(total_questions(&dist), 54);
        assert_eq!(dist[&Part::A], 20);
    }

    #[test]
    fn secondary_ignores_trade_table() {
        let dist = distribution_for(PaperType::Secondary, Some(&trade("DMV", "DMV")));
        assert_eq!(total_questions(&dist), 43);
    }

    #[test]
    fn unknown_trade_falls_back_to_common() {
        let dist = distribution_for(PaperType::Primary, Some(&trade("XYZ", "Unlisted")));
        assert_eq!(dist, common_distribution());
    }

    #[test]
    fn lookup_tolerates_missing_spaces_and_case() {
        assert!(trade_distribution("clksd").is_some());
        assert!(trade_distribution("  Clk   Sd").is_some());
    }
}
