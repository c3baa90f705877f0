use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::*;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use crate::dto::candidate_dto::CandidateFilter;
use crate::error::{Error, Result};
use crate::models::candidate::CandidateProfile;
use crate::services::candidate_service::CandidateService;
use crate::services::trade_service::TradeService;
use crate::utils::dat;
use crate::utils::time::{display_or_blank, file_stamp};

/// One question of a finished session together with the candidate's answer.
#[derive(Debug, Clone, FromRow)]
pub struct AnsweredQuestion {
    pub candidate_id: i64,
    pub exam_type: String,
    pub part: String,
    pub question: String,
    pub answer: Option<String>,
    pub correct_answer: Option<String>,
    pub marks: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct ExportData {
    pub candidates: Vec<CandidateProfile>,
    pub trade_codes: HashMap<i64, String>,
    pub answers: HashMap<i64, Vec<AnsweredQuestion>>,
}

impl ExportData {
    fn trade_code(&self, c: &CandidateProfile) -> &str {
        c.trade_id
            .and_then(|id| self.trade_codes.get(&id))
            .map(String::as_str)
            .unwrap_or("")
    }
}

const RESULT_COLUMNS: [(&str, f64); 32] = [
    ("S.No", 6.0),
    ("Name", 24.0),
    ("Center", 18.0),
    ("Fathers_Name", 24.0),
    ("Date of Birth", 14.0),
    ("Rank", 10.0),
    ("Trade", 12.0),
    ("Army_No", 14.0),
    ("Adhaar_No", 16.0),
    ("Mobile Number (Linked to Aadhaar Card)", 18.0),
    ("APAAR_ID", 16.0),
    ("Primary_Qualification", 18.0),
    ("Primary_Duration", 12.0),
    ("Primary_Credits", 12.0),
    ("Secondary_Qualification", 18.0),
    ("Secondary_Duration", 12.0),
    ("Secondary_Credits", 12.0),
    ("NSQF Level", 10.0),
    ("Training_Center", 18.0),
    ("District", 14.0),
    ("State", 14.0),
    ("Viva_1", 8.0),
    ("Viva_2", 8.0),
    ("Practical_1", 10.0),
    ("Practical_2", 10.0),
    ("Army_No", 14.0),
    ("Exam_Type", 12.0),
    ("Part", 6.0),
    ("Question", 50.0),
    ("Answer", 30.0),
    ("Correct_Answer", 30.0),
    ("Max_Marks", 10.0),
];

const MARKS_COLUMNS: [(&str, f64); 11] = [
    ("S.No", 6.0),
    ("Army_No", 14.0),
    ("Rank", 10.0),
    ("Name", 24.0),
    ("Trade", 12.0),
    ("Primary_Practical", 12.0),
    ("Primary_Viva", 12.0),
    ("Secondary_Practical", 12.0),
    ("Secondary_Viva", 12.0),
    ("Primary_Completed", 12.0),
    ("Secondary_Completed", 12.0),
];

/// `{center}.dat` with anything but ASCII alphanumerics replaced by `_`;
/// a timestamped name when no center is configured.
pub fn dat_file_name(center: Option<&str>, now: DateTime<Utc>) -> String {
    match center.map(str::trim).filter(|c| !c.is_empty()) {
        Some(center) => {
            let safe: String = center
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("{}.dat", safe)
        }
        None => format!("candidates_export_{}.dat", file_stamp(now)),
    }
}

fn write_title(worksheet: &mut Worksheet, title: &str, subtitle: &str, last_col: u16) -> Result<()> {
    let band = Color::RGB(0x1E293B);
    let title_format = Format::new()
        .set_font_size(14)
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(band)
        .set_align(FormatAlign::CenterAcross)
        .set_align(FormatAlign::VerticalCenter);
    let subtitle_format = Format::new()
        .set_font_size(10)
        .set_italic()
        .set_font_color(Color::RGB(0x94A3B8))
        .set_background_color(band)
        .set_align(FormatAlign::CenterAcross)
        .set_align(FormatAlign::VerticalCenter);

    worksheet.set_row_height(0, 32)?;
    worksheet.merge_range(0, 0, 0, last_col, title, &title_format)?;
    worksheet.set_row_height(1, 20)?;
    worksheet.merge_range(1, 0, 1, last_col, subtitle, &subtitle_format)?;
    Ok(())
}

fn write_header(worksheet: &mut Worksheet, row: u32, columns: &[(&str, f64)]) -> Result<()> {
    let header_format = Format::new()
        .set_bold()
        .set_font_size(10)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x0F172A))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xE2E8F0));
    worksheet.set_row_height(row, 30)?;
    for (i, (name, width)) in columns.iter().enumerate() {
        worksheet.set_column_width(i as u16, *width)?;
        worksheet.write_string_with_format(row, i as u16, *name, &header_format)?;
    }
    Ok(())
}

fn write_optional_number(worksheet: &mut Worksheet, row: u32, col: u16, value: Option<i32>, fmt: &Format) -> Result<()> {
    match value {
        Some(v) => worksheet.write_number_with_format(row, col, f64::from(v), fmt)?,
        None => worksheet.write_string_with_format(row, col, "", fmt)?,
    };
    Ok(())
}

#[derive(Clone)]
pub struct ExportService {
    pool: PgPool,
    candidates: CandidateService,
    trades: TradeService,
}

impl ExportService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            candidates: CandidateService::new(pool.clone()),
            trades: TradeService::new(pool.clone()),
            pool,
        }
    }

    /// Candidates matching `filter` plus every question of their finished sessions.
    pub async fn load(&self, filter: &CandidateFilter) -> Result<ExportData> {
        let candidates = self.candidates.list_profiles(filter).await?;
        let trade_codes = self
            .trades
            .list()
            .await?
            .into_iter()
            .map(|t| (t.id, t.code))
            .collect();

        let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
        let rows = sqlx::query_as::<_, AnsweredQuestion>(
            r#"
            SELECT s.candidate_id, p.paper_type AS exam_type, q.part, q.text AS question,
                   ca.answer, q.correct_answer, q.marks
            FROM exam_sessions s
            JOIN question_papers p ON p.id = s.paper_id
            JOIN exam_questions eq ON eq.session_id = s.id
            JOIN questions q ON q.id = eq.question_id
            LEFT JOIN candidate_answers ca
                   ON ca.candidate_id = s.candidate_id AND ca.paper_id = s.paper_id
                  AND ca.question_id = q.id AND ca.exam_type = p.paper_type
            WHERE s.completed_at IS NOT NULL AND s.candidate_id = ANY($1)
            ORDER BY s.candidate_id, p.paper_type, eq.position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut answers: HashMap<i64, Vec<AnsweredQuestion>> = HashMap::new();
        for row in rows {
            answers.entry(row.candidate_id).or_default().push(row);
        }

        tracing::debug!(candidates = candidates.len(), with_answers = answers.len(), "export data loaded");
        Ok(ExportData {
            candidates,
            trade_codes,
            answers,
        })
    }

    /// One row per candidate question; candidates without a finished exam get
    /// a single row with the exam columns left blank.
    pub fn results_xlsx(data: &ExportData) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Results")?;

        let last_col = (RESULT_COLUMNS.len() - 1) as u16;
        let subtitle = format!(
            "Exported {}  •  Candidates: {}",
            Utc::now().format("%d.%m.%Y %H:%M UTC"),
            data.candidates.len()
        );
        write_title(worksheet, "Trade Test Results", &subtitle, last_col)?;
        let header_row = 2;
        write_header(worksheet, header_row, &RESULT_COLUMNS)?;

        let base_fmt = Format::new()
            .set_font_size(10)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin)
            .set_border_color(Color::RGB(0xE2E8F0));
        let wrap_fmt = base_fmt.clone().set_text_wrap();
        let missing_fmt = base_fmt.clone().set_font_color(Color::RGB(0xEF4444));

        let mut row = header_row + 1;
        for (idx, c) in data.candidates.iter().enumerate() {
            let identity: [&str; 20] = [
                &c.name,
                c.exam_center.as_deref().unwrap_or(""),
                &c.father_name,
                &c.dob,
                &c.rank,
                data.trade_code(c),
                &c.army_no,
                &c.aadhar_number,
                c.mobile_no.as_deref().unwrap_or(""),
                &c.apaar_id,
                c.primary_qualification.as_deref().unwrap_or(""),
                c.primary_duration.as_deref().unwrap_or(""),
                c.primary_credits.as_deref().unwrap_or(""),
                c.secondary_qualification.as_deref().unwrap_or(""),
                c.secondary_duration.as_deref().unwrap_or(""),
                c.secondary_credits.as_deref().unwrap_or(""),
                &c.nsqf_level,
                c.training_center.as_deref().unwrap_or(""),
                &c.district,
                &c.state,
            ];

            let questions = data.answers.get(&c.id).map(Vec::as_slice).unwrap_or(&[]);
            let lines: Vec<Option<&AnsweredQuestion>> = if questions.is_empty() {
                vec![None]
            } else {
                questions.iter().map(Some).collect()
            };

            for line in lines {
                worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &base_fmt)?;
                for (i, value) in identity.iter().enumerate() {
                    worksheet.write_string_with_format(row, (i + 1) as u16, *value, &base_fmt)?;
                }
                write_optional_number(worksheet, row, 21, c.primary_viva_marks, &base_fmt)?;
                write_optional_number(worksheet, row, 22, c.secondary_viva_marks, &base_fmt)?;
                write_optional_number(worksheet, row, 23, c.primary_practical_marks, &base_fmt)?;
                write_optional_number(worksheet, row, 24, c.secondary_practical_marks, &base_fmt)?;
                worksheet.write_string_with_format(row, 25, &c.army_no, &base_fmt)?;

                if let Some(q) = line {
                    worksheet.write_string_with_format(row, 26, &q.exam_type, &base_fmt)?;
                    worksheet.write_string_with_format(row, 27, &q.part, &base_fmt)?;
                    worksheet.write_string_with_format(row, 28, &q.question, &wrap_fmt)?;
                    match q.answer.as_deref().filter(|a| !a.trim().is_empty()) {
                        Some(answer) => worksheet.write_string_with_format(row, 29, answer, &wrap_fmt)?,
                        None => worksheet.write_string_with_format(row, 29, "N/A", &missing_fmt)?,
                    };
                    worksheet.write_string_with_format(row, 30, q.correct_answer.as_deref().unwrap_or(""), &wrap_fmt)?;
                    worksheet.write_number_with_format(row, 31, q.marks.to_f64().unwrap_or(0.0), &base_fmt)?;
                }
                row += 1;
            }
        }

        worksheet.set_freeze_panes(header_row + 1, 0)?;
        worksheet.autofilter(header_row, 0, (row - 1).max(header_row), last_col)?;
        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }

    pub fn marks_xlsx(data: &ExportData) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Marks")?;

        let last_col = (MARKS_COLUMNS.len() - 1) as u16;
        let subtitle = format!("Candidates: {}", data.candidates.len());
        write_title(worksheet, "Practical & Viva Marks", &subtitle, last_col)?;
        write_header(worksheet, 2, &MARKS_COLUMNS)?;

        let fmt = Format::new()
            .set_font_size(10)
            .set_border(FormatBorder::Thin)
            .set_border_color(Color::RGB(0xE2E8F0));
        let done_fmt = fmt.clone().set_bold().set_font_color(Color::RGB(0x10B981));

        for (idx, c) in data.candidates.iter().enumerate() {
            let row = 3 + idx as u32;
            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &fmt)?;
            worksheet.write_string_with_format(row, 1, &c.army_no, &fmt)?;
            worksheet.write_string_with_format(row, 2, &c.rank, &fmt)?;
            worksheet.write_string_with_format(row, 3, &c.name, &fmt)?;
            worksheet.write_string_with_format(row, 4, data.trade_code(c), &fmt)?;
            write_optional_number(worksheet, row, 5, c.primary_practical_marks, &fmt)?;
            write_optional_number(worksheet, row, 6, c.primary_viva_marks, &fmt)?;
            write_optional_number(worksheet, row, 7, c.secondary_practical_marks, &fmt)?;
            write_optional_number(worksheet, row, 8, c.secondary_viva_marks, &fmt)?;
            for (col, done) in [(9u16, c.is_primary_completed), (10, c.is_secondary_completed)] {
                if done {
                    worksheet.write_string_with_format(row, col, "Yes", &done_fmt)?;
                } else {
                    worksheet.write_string_with_format(row, col, "No", &fmt)?;
                }
            }
        }

        worksheet.set_freeze_panes(3, 0)?;
        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }

    pub fn answers_csv(data: &ExportData) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "army_no",
            "name",
            "trade",
            "exam_type",
            "part",
            "question",
            "answer",
            "correct_answer",
            "marks",
            "slot_consumed_at",
        ])?;
        for c in &data.candidates {
            let consumed = display_or_blank(c.slot_consumed_at);
            for q in data.answers.get(&c.id).into_iter().flatten() {
                let marks = q.marks.to_string();
                writer.write_record([
                    c.army_no.as_str(),
                    c.name.as_str(),
                    data.trade_code(c),
                    q.exam_type.as_str(),
                    q.part.as_str(),
                    q.question.as_str(),
                    q.answer.as_deref().unwrap_or(""),
                    q.correct_answer.as_deref().unwrap_or(""),
                    marks.as_str(),
                    consumed.as_str(),
                ])?;
            }
        }
        writer
            .into_inner()
            .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))
    }

    /// The results workbook sealed in a `.dat` container.
    pub fn results_dat(data: &ExportData, passphrase: &str) -> Result<Vec<u8>> {
        let workbook = Self::results_xlsx(data)?;
        dat::encrypt(&workbook, passphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::tests::candidate;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use chrono::TimeZone;
    use std::io::Cursor;

    fn answered(candidate_id: i64, answer: Option<&str>) -> AnsweredQuestion {
        AnsweredQuestion {
            candidate_id,
            exam_type: "PRIMARY".into(),
            part: "A".into(),
            question: "Which gear is used uphill?".into(),
            answer: answer.map(str::to_string),
            correct_answer: Some("First".into()),
            marks: Decimal::ONE,
        }
    }

    fn data() -> ExportData {
        let first = candidate();
        let mut second = candidate();
        second.id = 2;
        second.army_no = "JC000002".into();
        ExportData {
            candidates: vec![first, second],
            trade_codes: HashMap::from([(3, "DMV".to_string())]),
            answers: HashMap::from([(1, vec![answered(1, Some("First")), answered(1, None)])]),
        }
    }

    fn sheet_rows(bytes: &[u8]) -> Vec<Vec<Data>> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        range.rows().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn results_have_one_row_per_question_and_blank_row_for_no_exam() {
        let bytes = ExportService::results_xlsx(&data()).unwrap();
        assert!(dat::looks_like_xlsx(&bytes));
        let rows = sheet_rows(&bytes);
        // title, subtitle, header, two answered questions, one empty candidate
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[2][0], Data::String("S.No".into()));
        assert_eq!(rows[3][6], Data::String("DMV".into()));
        assert_eq!(rows[3][29], Data::String("First".into()));
        assert_eq!(rows[4][29], Data::String("N/A".into()));
        assert_eq!(rows[5][7], Data::String("JC000002".into()));
        assert_eq!(rows[5][25], Data::String("JC000002".into()));
    }

    #[test]
    fn dat_export_decrypts_to_the_workbook() {
        let sealed = ExportService::results_dat(&data(), "pass").unwrap();
        let opened = dat::decrypt(&sealed, "pass").unwrap();
        assert!(dat::looks_like_xlsx(&opened));
        assert_eq!(sheet_rows(&opened).len(), 6);
    }

    #[test]
    fn answers_csv_lists_answered_questions_only() {
        let bytes = ExportService::answers_csv(&data()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("army_no,name,trade"));
        assert!(lines[1].starts_with("JC123456,Test Candidate,DMV,PRIMARY,A"));
    }

    #[test]
    fn dat_names_follow_center_or_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(dat_file_name(Some("ASC Centre (S)"), at), "ASC_Centre__S_.dat");
        assert_eq!(dat_file_name(Some("  "), at), "candidates_export_20260203040506.dat");
        assert_eq!(dat_file_name(None, at), "candidates_export_20260203040506.dat");
    }
}
