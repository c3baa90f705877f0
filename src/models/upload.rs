use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionUpload {
    pub id: i64,
    pub file_name: String,
    pub format: String,
    pub created_count: i32,
    pub skipped_count: i32,
    pub uploaded_by: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    Csv,
    Dat,
    Xlsx,
}

impl UploadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadFormat::Csv => "csv",
            UploadFormat::Dat => "dat",
            UploadFormat::Xlsx => "xlsx",
        }
    }

    /// Picks the format from the file extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(UploadFormat::Csv),
            "dat" => Some(UploadFormat::Dat),
            "xlsx" => Some(UploadFormat::Xlsx),
            _ => None,
        }
    }
}
