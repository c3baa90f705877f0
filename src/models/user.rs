use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Officer in charge; full administrative access.
    OicAdmin,
    /// Presiding officer; marks entry, slots and exports.
    PoAdmin,
    Candidate,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::OicAdmin => "OIC_ADMIN",
            Role::PoAdmin => "PO_ADMIN",
            Role::Candidate => "CANDIDATE",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::OicAdmin | Role::PoAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OIC_ADMIN" => Ok(Role::OicAdmin),
            "PO_ADMIN" => Ok(Role::PoAdmin),
            "CANDIDATE" => Ok(Role::Candidate),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}
