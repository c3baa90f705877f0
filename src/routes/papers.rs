use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;

use crate::{
    dto::admin_dto::UpdatePaperPayload,
    error::{Error, Result},
    middleware::auth::Claims,
    models::question::PaperType,
    routes::actor,
    services::paper_service::ActivationUpdate,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/papers",
    responses((status = 200, description = "PRIMARY and SECONDARY paper settings"))
)]
pub async fn list_papers(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.paper_service.list_papers().await?))
}

#[utoipa::path(
    patch,
    path = "/api/admin/papers/{paper_type}",
    params(("paper_type" = String, Path, description = "PRIMARY or SECONDARY")),
    responses(
        (status = 200, description = "Paper updated"),
        (status = 400, description = "Unknown paper type or bad duration")
    )
)]
pub async fn update_paper(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(paper_type): Path<String>,
    Json(payload): Json<UpdatePaperPayload>,
) -> Result<impl IntoResponse> {
    let paper_type: PaperType = paper_type.to_ascii_uppercase().parse().map_err(Error::BadRequest)?;
    let paper = state
        .paper_service
        .update_paper(paper_type, payload.is_active, payload.exam_duration_minutes)
        .await?;
    state
        .audit_service
        .record(
            actor(&claims),
            "update_paper",
            "question_paper",
            Some(paper.id),
            Some(json!({ "is_active": paper.is_active, "exam_duration_minutes": paper.exam_duration_minutes })),
        )
        .await;
    Ok(Json(paper))
}

#[utoipa::path(
    get,
    path = "/api/admin/activations",
    responses((status = 200, description = "Activation per trade and paper type"))
)]
pub async fn list_activations(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.paper_service.list_activations().await?))
}

/// Creates or replaces the activation for one (trade, paper type).
#[utoipa::path(
    put,
    path = "/api/admin/activations",
    responses(
        (status = 200, description = "Activation saved"),
        (status = 404, description = "Trade not found")
    )
)]
pub async fn upsert_activation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ActivationUpdate>,
) -> Result<impl IntoResponse> {
    state.trade_service.get(payload.trade_id).await?;
    let activation = state.paper_service.upsert_activation(&payload).await?;
    state
        .audit_service
        .record(
            actor(&claims),
            "upsert_activation",
            "paper_activation",
            Some(activation.id),
            Some(json!({
                "trade_id": activation.trade_id,
                "paper_type": activation.paper_type,
                "is_active": activation.is_active,
                "question_set": activation.question_set,
                "exam_duration_minutes": activation.exam_duration_minutes,
            })),
        )
        .await;
    Ok(Json(activation))
}
