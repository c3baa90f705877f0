use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    config::get_config,
    dto::admin_dto::{CreateTradePayload, QuestionFilter, SetActivePayload},
    error::{Error, Result},
    middleware::auth::Claims,
    models::question::NewQuestion,
    models::upload::UploadFormat,
    routes::actor,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct UploadListQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/admin/trades",
    responses((status = 200, description = "All trades ordered by code"))
)]
pub async fn list_trades(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.trade_service.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/trades",
    responses(
        (status = 201, description = "Trade created"),
        (status = 409, description = "Trade code already exists")
    )
)]
pub async fn create_trade(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTradePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let trade = state.trade_service.create(&payload.code, &payload.name).await?;
    state
        .audit_service
        .record(actor(&claims), "create_trade", "trade", Some(trade.id), Some(json!({ "code": trade.code })))
        .await;
    Ok((StatusCode::CREATED, Json(trade)))
}

#[utoipa::path(
    get,
    path = "/api/admin/questions",
    params(
        ("trade_id" = Option<i64>, Query, description = "Owning trade"),
        ("paper_type" = Option<String>, Query, description = "PRIMARY or SECONDARY"),
        ("part" = Option<String>, Query, description = "Part A-F"),
        ("question_set" = Option<String>, Query, description = "Set label A-Z"),
        ("is_active" = Option<bool>, Query, description = "Active flag")
    ),
    responses((status = 200, description = "Matching questions"))
)]
pub async fn list_questions(
    State(state): State<AppState>,
    Query(filter): Query<QuestionFilter>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.question_service.list(&filter).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/questions",
    responses(
        (status = 201, description = "Question created"),
        (status = 400, description = "Invalid question")
    )
)]
pub async fn create_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewQuestion>,
) -> Result<impl IntoResponse> {
    let question = state.question_service.create(&payload).await?;
    state
        .audit_service
        .record(actor(&claims), "create_question", "question", Some(question.id), None)
        .await;
    Ok((StatusCode::CREATED, Json(question)))
}

#[utoipa::path(
    patch,
    path = "/api/admin/questions/{id}/active",
    params(("id" = i64, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Question updated"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn set_question_active(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SetActivePayload>,
) -> Result<impl IntoResponse> {
    let question = state.question_service.set_active(id, payload.is_active).await?;
    state
        .audit_service
        .record(
            actor(&claims),
            "set_question_active",
            "question",
            Some(id),
            Some(json!({ "is_active": payload.is_active })),
        )
        .await;
    Ok(Json(question))
}

#[utoipa::path(
    delete,
    path = "/api/admin/questions/{id}",
    params(("id" = i64, Path, description = "Question ID")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 409, description = "Question already used in a session")
    )
)]
pub async fn delete_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.question_service.delete(id).await?;
    state
        .audit_service
        .record(actor(&claims), "delete_question", "question", Some(id), None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart upload with a single `file` field (`.csv`, `.dat` or `.xlsx`).
#[utoipa::path(
    post,
    path = "/api/admin/question-uploads",
    responses(
        (status = 201, description = "Created and skipped counts"),
        (status = 400, description = "Unreadable or unsupported file"),
        (status = 422, description = "CSV rows rejected; nothing imported")
    )
)]
pub async fn upload_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field.bytes().await?;
        upload = Some((file_name, data.to_vec()));
    }
    let (file_name, data) = upload.ok_or_else(|| Error::BadRequest("Missing 'file' field".to_string()))?;
    if data.is_empty() {
        return Err(Error::BadRequest("Uploaded file is empty".to_string()));
    }
    let format = UploadFormat::from_file_name(&file_name).ok_or_else(|| {
        Error::BadRequest("Unsupported file type. Upload a .csv, .dat or .xlsx file".to_string())
    })?;

    let uploaded_by = actor(&claims);
    let summary = match format {
        UploadFormat::Csv => state.question_service.import_csv(&file_name, &data, uploaded_by).await?,
        UploadFormat::Dat | UploadFormat::Xlsx => {
            state
                .question_service
                .import_excel(&file_name, format, &data, &get_config().converter_passphrase, uploaded_by)
                .await?
        }
    };
    state
        .audit_service
        .record(
            uploaded_by,
            "upload_questions",
            "question_upload",
            Some(summary.upload_id),
            Some(json!({ "file_name": summary.file_name, "created": summary.created, "skipped": summary.skipped })),
        )
        .await;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/api/admin/question-uploads",
    responses((status = 200, description = "Most recent uploads first"))
)]
pub async fn list_uploads(
    State(state): State<AppState>,
    Query(query): Query<UploadListQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.question_service.list_uploads(limit).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/question-sets",
    responses((status = 200, description = "Active question counts per trade, paper type and set"))
)]
pub async fn available_sets(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.paper_service.available_sets().await?))
}
