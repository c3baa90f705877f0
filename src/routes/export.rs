use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension,
};
use serde_json::json;

use crate::{
    config::get_config,
    dto::candidate_dto::CandidateFilter,
    error::Result,
    middleware::auth::Claims,
    routes::actor,
    services::export_service::{dat_file_name, ExportService},
    utils::time::{file_stamp, now},
    AppState,
};

const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

fn attachment(content_type: &str, file_name: String, body: Vec<u8>) -> impl IntoResponse {
    let disposition = format!("attachment; filename=\"{}\"", file_name);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
}

#[utoipa::path(
    get,
    path = "/api/admin/export/results.xlsx",
    responses((status = 200, description = "Results workbook, one row per candidate question"))
)]
pub async fn export_results(
    State(state): State<AppState>,
    Query(filter): Query<CandidateFilter>,
) -> Result<impl IntoResponse> {
    let data = state.export_service.load(&filter).await?;
    let buffer = ExportService::results_xlsx(&data)?;
    Ok(attachment(XLSX, format!("exam_results_{}.xlsx", file_stamp(now())), buffer))
}

#[utoipa::path(
    get,
    path = "/api/admin/export/marks.xlsx",
    responses((status = 200, description = "Practical and viva marks workbook"))
)]
pub async fn export_marks(
    State(state): State<AppState>,
    Query(filter): Query<CandidateFilter>,
) -> Result<impl IntoResponse> {
    let data = state.export_service.load(&filter).await?;
    let buffer = ExportService::marks_xlsx(&data)?;
    Ok(attachment(XLSX, format!("candidate_marks_{}.xlsx", file_stamp(now())), buffer))
}

#[utoipa::path(
    get,
    path = "/api/admin/export/answers.csv",
    responses((status = 200, description = "Submitted answers as CSV"))
)]
pub async fn export_answers(
    State(state): State<AppState>,
    Query(filter): Query<CandidateFilter>,
) -> Result<impl IntoResponse> {
    let data = state.export_service.load(&filter).await?;
    let buffer = ExportService::answers_csv(&data)?;
    Ok(attachment(
        "text/csv; charset=utf-8",
        format!("candidate_answers_{}.csv", file_stamp(now())),
        buffer,
    ))
}

/// Results workbook sealed with the converter passphrase.
#[utoipa::path(
    get,
    path = "/api/admin/export/results.dat",
    responses((status = 200, description = "Encrypted results container"))
)]
pub async fn export_dat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<CandidateFilter>,
) -> Result<impl IntoResponse> {
    let config = get_config();
    let data = state.export_service.load(&filter).await?;
    let buffer = ExportService::results_dat(&data, &config.converter_passphrase)?;
    let file_name = dat_file_name(config.export_center_name.as_deref(), now());
    state
        .audit_service
        .record(
            actor(&claims),
            "export_dat",
            "candidate",
            None,
            Some(json!({ "candidates": data.candidates.len(), "file_name": file_name })),
        )
        .await;
    Ok(attachment("application/octet-stream", file_name, buffer))
}
