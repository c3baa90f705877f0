use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    dto::admin_dto::{CleanupPayload, ClearSessionsPayload},
    error::Result,
    middleware::auth::Claims,
    routes::actor,
    services::maintenance_service::CleanupLevel,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct DryRunQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/admin/maintenance/cleanup",
    responses(
        (status = 200, description = "Rows counted (dry run) or removed per table"),
        (status = 400, description = "Unknown cleanup level")
    )
)]
pub async fn cleanup(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CleanupPayload>,
) -> Result<impl IntoResponse> {
    let level: CleanupLevel = payload.level.parse()?;
    let report = state.maintenance_service.cleanup(level, payload.dry_run).await?;
    if !payload.dry_run {
        state
            .audit_service
            .record(
                actor(&claims),
                "cleanup",
                "database",
                None,
                Some(json!({ "level": level.as_str(), "rows": report.total() })),
            )
            .await;
    }
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/admin/maintenance/clear-results",
    params(("dry_run" = Option<bool>, Query, description = "Only count rows")),
    responses((status = 200, description = "Rows counted or removed per table"))
)]
pub async fn clear_exam_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<DryRunQuery>,
) -> Result<impl IntoResponse> {
    let report = state.maintenance_service.clear_exam_results(query.dry_run).await?;
    if !query.dry_run {
        state
            .audit_service
            .record(actor(&claims), "clear_exam_results", "database", None, Some(json!({ "rows": report.total() })))
            .await;
    }
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/admin/maintenance/clear-incomplete-sessions",
    responses((status = 200, description = "Number of unfinished sessions removed"))
)]
pub async fn clear_incomplete_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ClearSessionsPayload>,
) -> Result<impl IntoResponse> {
    let removed = state.maintenance_service.clear_incomplete_sessions(&payload).await?;
    state
        .audit_service
        .record(
            actor(&claims),
            "clear_incomplete_sessions",
            "exam_session",
            None,
            Some(json!({ "removed": removed, "trade_id": payload.trade_id, "candidate_id": payload.candidate_id })),
        )
        .await;
    Ok(Json(json!({ "removed": removed })))
}

#[utoipa::path(
    get,
    path = "/api/admin/maintenance/stats",
    responses((status = 200, description = "Row counts across the schema"))
)]
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.maintenance_service.stats().await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/audit-logs",
    params(("limit" = Option<i64>, Query, description = "Maximum entries, newest first")),
    responses((status = 200, description = "Recent admin actions"))
)]
pub async fn audit_logs(State(state): State<AppState>, Query(query): Query<AuditQuery>) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(state.audit_service.recent(limit).await?))
}
