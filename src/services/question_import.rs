//! Lenient workbook import used for `.dat` and `.xlsx` uploads.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::io::Cursor;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::question::{PaperType, Part, QuestionSet};
use crate::models::trade::normalize_trade_name;

/// One question row read from a workbook, before trade resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedQuestion {
    pub text: String,
    pub part: Part,
    pub marks: Decimal,
    pub options: [Option<String>; 4],
    pub correct_answer: Option<String>,
    /// Normalised trade cell, e.g. "OCC" or "ALL"; empty when absent.
    pub trade: String,
    pub paper_type: PaperType,
    pub question_set: QuestionSet,
}

impl ImportedQuestion {
    pub fn is_common(&self) -> bool {
        self.trade == "ALL" || self.paper_type == PaperType::Secondary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Text,
    Part,
    Marks,
    Options,
    Option(usize),
    Correct,
    Trade,
    PaperType,
    QuestionSet,
}

fn classify_header(raw: &str) -> Option<Column> {
    let header = normalize_trade_name(&raw.replace('_', " "));
    let column = match header.as_str() {
        "QUESTION" | "QUESTIONS" | "Q" | "QNS" | "QUESTION TEXT" => Column::Text,
        "PART" | "SECTION" => Column::Part,
        "MARKS" | "MARK" | "SCORE" => Column::Marks,
        "OPTION" | "OPTIONS" | "OPT" => Column::Options,
        "OPTION A" => Column::Option(0),
        "OPTION B" => Column::Option(1),
        "OPTION C" => Column::Option(2),
        "OPTION D" => Column::Option(3),
        "CORRECT" | "CORRECT ANSWER" | "ANSWER" | "ANS" => Column::Correct,
        "TRADE" | "TRADE NAME" => Column::Trade,
        "PAPER TYPE" | "PAPER" | "TYPE" => Column::PaperType,
        "QUESTION SET" | "SET" => Column::QuestionSet,
        _ => return None,
    };
    Some(column)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

fn parse_json(raw: &str) -> Option<JsonValue> {
    let looks_json = (raw.starts_with('[') && raw.ends_with(']')) || (raw.starts_with('{') && raw.ends_with('}'));
    if looks_json {
        serde_json::from_str(raw).ok()
    } else {
        None
    }
}

fn json_scalar(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => Some(other.to_string()),
    }
}

/// Accepts a JSON list, a JSON object keyed a-d, or newline-separated text.
fn split_options(raw: &str) -> [Option<String>; 4] {
    let mut out: [Option<String>; 4] = Default::default();
    match parse_json(raw) {
        Some(JsonValue::Array(items)) => {
            for (slot, item) in out.iter_mut().zip(items.iter()) {
                *slot = json_scalar(item);
            }
        }
        Some(JsonValue::Object(map)) => {
            for (key, value) in map {
                let idx = match key.trim().to_ascii_lowercase().trim_start_matches("option_") {
                    "a" => 0,
                    "b" => 1,
                    "c" => 2,
                    "d" => 3,
                    _ => continue,
                };
                out[idx] = json_scalar(&value);
            }
        }
        _ => {
            let lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
            for (slot, line) in out.iter_mut().zip(lines) {
                *slot = Some(line.to_string());
            }
        }
    }
    out
}

/// A bare option letter or key ("B", "option_b") is replaced by that option's text.
fn resolve_correct(raw: &str, options: &[Option<String>; 4]) -> Option<String> {
    let value = match parse_json(raw) {
        Some(JsonValue::Array(items)) => items.first().and_then(json_scalar)?,
        Some(other) => json_scalar(&other)?,
        None => raw.trim().to_string(),
    };
    if value.is_empty() {
        return None;
    }
    let key = value.to_ascii_lowercase();
    let idx = match key.trim_start_matches("option_").trim_start_matches("option ") {
        "a" => Some(0),
        "b" => Some(1),
        "c" => Some(2),
        "d" => Some(3),
        _ => None,
    };
    match idx.and_then(|i| options[i].clone()) {
        Some(text) => Some(text),
        None => Some(value),
    }
}

/// Maps a header row plus data rows into questions. Rows without question
/// text are ignored; missing cells fall back to part A, 1 mark and set A.
pub fn parse_rows(rows: &[Vec<String>]) -> Result<Vec<ImportedQuestion>> {
    let Some((header, data)) = rows.split_first() else {
        return Err(Error::BadRequest("Excel sheet is empty.".to_string()));
    };
    let columns: Vec<Option<Column>> = header.iter().map(|h| classify_header(h)).collect();
    if !columns.contains(&Some(Column::Text)) {
        return Err(Error::BadRequest(
            "Excel must contain a Question column (e.g., 'Question').".to_string(),
        ));
    }

    let mut out = Vec::new();
    for row in data {
        let get = |wanted: Column| -> String {
            columns
                .iter()
                .position(|c| *c == Some(wanted))
                .and_then(|i| row.get(i))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let text = get(Column::Text);
        if text.is_empty() {
            continue;
        }

        let part = normalize_trade_name(&get(Column::Part))
            .chars()
            .next()
            .and_then(|c| Part::from_str(&c.to_string()).ok())
            .unwrap_or(Part::A);

        let marks = Decimal::from_str(&get(Column::Marks))
            .ok()
            .filter(|m| *m > Decimal::ZERO)
            .unwrap_or(Decimal::ONE);

        let trade = normalize_trade_name(&get(Column::Trade));
        let paper_type = match normalize_trade_name(&get(Column::PaperType)).as_str() {
            "PRIMARY" | "P" => PaperType::Primary,
            "SECONDARY" | "S" => PaperType::Secondary,
            _ if trade == "ALL" => PaperType::Secondary,
            _ => PaperType::Primary,
        };

        let mut options = split_options(&get(Column::Options));
        for (idx, slot) in options.iter_mut().enumerate() {
            let single = get(Column::Option(idx));
            if !single.is_empty() {
                *slot = Some(single);
            }
        }
        let correct_answer = resolve_correct(&get(Column::Correct), &options);

        let question_set = get(Column::QuestionSet)
            .to_ascii_uppercase()
            .parse()
            .unwrap_or_default();

        out.push(ImportedQuestion {
            text,
            part,
            marks,
            options,
            correct_answer,
            trade,
            paper_type,
            question_set,
        });
    }
    Ok(out)
}

/// Reads the first worksheet of an `.xlsx` payload.
pub fn load_questions_from_excel(bytes: &[u8]) -> Result<Vec<ImportedQuestion>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::BadRequest("Excel file has no worksheets.".to_string()))??;
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    parse_rows(&rows)
}
