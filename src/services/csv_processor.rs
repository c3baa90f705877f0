//! Strict CSV question upload: every row must validate or nothing is imported.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::models::question::{NewQuestion, PaperType, Part, QuestionSet};

pub const REQUIRED_COLUMNS: [&str; 13] = [
    "question",
    "part",
    "marks",
    "option_a",
    "option_b",
    "option_c",
    "option_d",
    "correct_answer",
    "trade",
    "paper_type",
    "question_set",
    "is_common",
    "is_active",
];

const OPTION_KEYS: [&str; 4] = ["option_a", "option_b", "option_c", "option_d"];

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn field<'r>(record: &'r csv::StringRecord, index: &HashMap<&str, usize>, name: &str) -> &'r str {
    index.get(name).and_then(|&i| record.get(i)).unwrap_or("").trim()
}

/// Parses and validates a CSV upload. `trades` maps trade codes to ids.
/// Errors are one message per offending row (rows counted from 2) or a single
/// header-level message.
pub fn parse_questions_csv(
    content: &[u8],
    trades: &HashMap<String, i64>,
) -> Result<Vec<NewQuestion>, Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(str::to_string).collect(),
        Err(e) => return Err(vec![format!("File processing error: {}", e)]),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(vec!["CSV file appears to be empty or invalid".to_string()]);
    }
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == c))
        .collect();
    if !missing.is_empty() {
        return Err(vec![format!("Missing required columns: {}", missing.join(", "))]);
    }
    if headers.iter().any(|h| h == "options") {
        return Err(vec![
            "Old JSON format detected. Please use separate option_a, option_b, option_c, option_d columns instead of 'options' column."
                .to_string(),
        ]);
    }
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();

    let mut errors = Vec::new();
    let mut questions = Vec::new();

    for (offset, record) in reader.records().enumerate() {
        let row_num = offset + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("Row {}: unreadable ({})", row_num, e));
                continue;
            }
        };
        let cell = |name: &str| field(&record, &index, name);

        let empty: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| cell(**c).is_empty())
            .map(|c| format!("Column '{}' is empty", c))
            .collect();
        if !empty.is_empty() {
            errors.push(format!("Row {}: {}", row_num, empty.join("; ")));
            continue;
        }

        let mut row_errors = Vec::new();
        let part = Part::from_str(cell("part")).map_err(|e| row_errors.push(e)).ok();
        let paper_type = PaperType::from_str(cell("paper_type")).map_err(|e| row_errors.push(e)).ok();
        let question_set = QuestionSet::from_str(cell("question_set")).map_err(|e| row_errors.push(e)).ok();

        let correct_key = cell("correct_answer");
        if !OPTION_KEYS.contains(&correct_key) {
            row_errors.push(format!(
                "Invalid correct_answer '{}'. Must be option_a, option_b, option_c, or option_d",
                correct_key
            ));
        }

        let marks = match Decimal::from_str(cell("marks")) {
            Ok(m) if m > Decimal::ZERO => Some(m),
            Ok(_) => {
                row_errors.push("Marks must be greater than 0".to_string());
                None
            }
            Err(_) => {
                row_errors.push(format!("Invalid marks value '{}'. Must be a number", cell("marks")));
                None
            }
        };

        let trade_id = trades.get(cell("trade")).copied();
        if trade_id.is_none() {
            row_errors.push(format!("Trade '{}' does not exist", cell("trade")));
        }

        if !row_errors.is_empty() {
            errors.push(format!("Row {}: {}", row_num, row_errors.join("; ")));
            continue;
        }

        if let (Some(part), Some(paper_type), Some(question_set), Some(marks)) = (part, paper_type, question_set, marks) {
            questions.push(NewQuestion {
                text: cell("question").to_string(),
                part,
                marks,
                option_a: Some(cell("option_a").to_string()),
                option_b: Some(cell("option_b").to_string()),
                option_c: Some(cell("option_c").to_string()),
                option_d: Some(cell("option_d").to_string()),
                correct_answer: Some(cell(correct_key).to_string()),
                trade_id,
                paper_type,
                question_set,
                is_common: parse_flag(cell("is_common")),
                is_active: parse_flag(cell("is_active")),
            });
        }
    }

    if errors.is_empty() {
        Ok(questions)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "question,part,marks,option_a,option_b,option_c,option_d,correct_answer,trade,paper_type,question_set,is_common,is_active\n";

    fn trades() -> HashMap<String, i64> {
        HashMap::from([("OCC".to_string(), 1), ("DMV".to_string(), 2)])
    }

    #[test]
    fn valid_rows_resolve_correct_option_text() {
        let csv = format!(
            "{}What is 2+2?,A,1,3,4,5,6,option_b,OCC,PRIMARY,B,false,true\nSky colour?,F,2.5,Blue,Red,Green,Black,option_a,DMV,SECONDARY,A,yes,1\n",
            HEADER
        );
        let rows = parse_questions_csv(csv.as_bytes(), &trades()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].correct_answer.as_deref(), Some("4"));
        assert_eq!(rows[0].question_set.label(), 'B');
        assert_eq!(rows[0].trade_id, Some(1));
        assert!(!rows[0].is_common);
        assert!(rows[1].is_common);
        assert_eq!(rows[1].marks, Decimal::new(25, 1));
    }

    #[test]
    fn missing_question_set_rejects_whole_file() {
        let csv = format!(
            "{}Good row,A,1,a,b,c,d,option_a,OCC,PRIMARY,A,false,true\nBad row,A,1,a,b,c,d,option_a,OCC,PRIMARY,,false,true\n",
            HEADER
        );
        let errors = parse_questions_csv(csv.as_bytes(), &trades()).unwrap_err();
        assert_eq!(errors, vec!["Row 3: Column 'question_set' is empty".to_string()]);
    }

    #[test]
    fn row_errors_are_collected_per_row() {
        let csv = format!(
            "{}Q1,G,0,a,b,c,d,option_e,XXX,PRIMARY,A,false,true\nQ2,A,abc,a,b,c,d,option_a,OCC,TERTIARY,AA,false,true\n",
            HEADER
        );
        let errors = parse_questions_csv(csv.as_bytes(), &trades()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Row 2: Invalid part 'G'"));
        assert!(errors[0].contains("Marks must be greater than 0"));
        assert!(errors[0].contains("Trade 'XXX' does not exist"));
        assert!(errors[1].starts_with("Row 3:"));
        assert!(errors[1].contains("Invalid marks value 'abc'"));
        assert!(errors[1].contains("Invalid question_set 'AA'"));
    }

    #[test]
    fn legacy_options_column_is_refused() {
        let csv = "question,part,marks,option_a,option_b,option_c,option_d,correct_answer,trade,paper_type,question_set,is_common,is_active,options\n";
        let errors = parse_questions_csv(csv.as_bytes(), &trades()).unwrap_err();
        assert!(errors[0].starts_with("Old JSON format detected"));
    }

    #[test]
    fn missing_columns_are_named() {
        let errors = parse_questions_csv(b"question,part\nQ,A\n", &trades()).unwrap_err();
        assert!(errors[0].starts_with("Missing required columns: marks, option_a"));
    }
}
