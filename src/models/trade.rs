use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Upper-cases and collapses internal whitespace, so "clk  sd " matches "CLK SD".
pub fn normalize_trade_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Trades examined on the SECONDARY paper only.
pub const TRADES_WITHOUT_PRIMARY: [&str; 2] = ["HAIR DRESSER", "MUSICIAN"];

impl Trade {
    /// Canonical key used by the hard-coded per-trade tables.
    pub fn normalized_key(&self) -> String {
        let name = normalize_trade_name(&self.name);
        for known in ["WASHERMAN", "HOUSE KEEPER", "MUSICIAN", "HAIR DRESSER", "SP STAFF", "MESS KEEPER"] {
            if name.contains(known) {
                return known.to_string();
            }
        }
        name
    }

    /// Keys to try, in order, against the per-trade tables.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for candidate in [normalize_trade_name(&self.name), normalize_trade_name(&self.code), self.normalized_key()] {
            if !candidate.is_empty() && !keys.contains(&candidate) {
                keys.push(candidate);
            }
        }
        keys
    }

    pub fn has_primary_exam(&self) -> bool {
        !TRADES_WITHOUT_PRIMARY.contains(&self.normalized_key().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(code: &str, name: &str) -> Trade {
        Trade {
            id: 1,
            code: code.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(normalize_trade_name("  clk   sd "), "CLK SD");
    }

    #[test]
    fn trades_without_primary_are_detected_by_substring() {
        assert!(!trade("HD", "Hair Dresser (Gents)").has_primary_exam());
        assert!(!trade("MUS", "musician").has_primary_exam());
        assert!(trade("OCC", "OCC").has_primary_exam());
    }
}
