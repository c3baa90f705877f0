use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;

use crate::{
    dto::candidate_dto::{BulkSlotPayload, BypassPayload, CandidateFilter, CandidateSummary, MarksPayload},
    error::{Error, Result},
    middleware::auth::Claims,
    models::candidate::marks_limits,
    routes::actor,
    services::slot_service::BulkAction,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/candidates",
    params(
        ("trade_id" = Option<i64>, Query, description = "Trade filter"),
        ("has_slot" = Option<bool>, Query, description = "Only candidates holding a slot"),
        ("search" = Option<String>, Query, description = "Name or army number fragment")
    ),
    responses((status = 200, description = "Candidates with slot status"))
)]
pub async fn list_candidates(
    State(state): State<AppState>,
    Query(filter): Query<CandidateFilter>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.candidate_service.list(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/candidates/{id}",
    params(("id" = i64, Path, description = "Candidate ID")),
    responses(
        (status = 200, description = "Full candidate profile with marks limits"),
        (status = 404, description = "Candidate not found")
    )
)]
pub async fn get_candidate(State(state): State<AppState>, Path(id): Path<i64>) -> Result<impl IntoResponse> {
    let profile = state.candidate_service.get(id).await?;
    let trade = state.trade_service.find(profile.trade_id).await?;
    let limits = trade.as_ref().map(|t| {
        json!({
            "primary": marks_limits(t, crate::models::question::PaperType::Primary),
            "secondary": marks_limits(t, crate::models::question::PaperType::Secondary),
        })
    });
    let active = state.paper_service.active_papers(profile.trade_id).await?;
    Ok(Json(json!({
        "profile": profile,
        "trade": trade,
        "slot_status": profile.slot_status(),
        "can_start_exam": profile.can_start_exam(trade.as_ref(), active),
        "next_exam_type": trade.as_ref().map(|t| profile.next_exam_type(t)),
        "marks_limits": limits,
    })))
}

#[utoipa::path(
    delete,
    path = "/api/admin/candidates/{id}",
    params(("id" = i64, Path, description = "Candidate ID")),
    responses(
        (status = 204, description = "Candidate, answers and account removed"),
        (status = 404, description = "Candidate not found")
    )
)]
pub async fn delete_candidate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.candidate_service.delete(id).await?;
    state
        .audit_service
        .record(actor(&claims), "delete_candidate", "candidate", Some(id), None)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/admin/candidates/{id}/marks",
    params(("id" = i64, Path, description = "Candidate ID")),
    responses(
        (status = 200, description = "Marks saved and completion recomputed"),
        (status = 422, description = "Marks outside the trade's limits")
    )
)]
pub async fn update_marks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<MarksPayload>,
) -> Result<impl IntoResponse> {
    let profile = state
        .candidate_service
        .update_marks(id, payload.paper_type, payload.marks)
        .await?;
    state
        .audit_service
        .record(
            actor(&claims),
            "update_marks",
            "candidate",
            Some(id),
            Some(json!({
                "paper_type": payload.paper_type,
                "practical": payload.marks.practical,
                "viva": payload.marks.viva,
            })),
        )
        .await;
    Ok(Json(profile))
}

#[utoipa::path(
    put,
    path = "/api/admin/candidates/{id}/primary-bypass",
    params(("id" = i64, Path, description = "Candidate ID")),
    responses((status = 200, description = "Bypass flag saved"))
)]
pub async fn set_primary_bypass(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<BypassPayload>,
) -> Result<impl IntoResponse> {
    let profile = state.candidate_service.set_primary_bypass(id, payload.allowed).await?;
    state
        .audit_service
        .record(
            actor(&claims),
            "set_primary_bypass",
            "candidate",
            Some(id),
            Some(json!({ "allowed": payload.allowed })),
        )
        .await;
    Ok(Json(profile))
}

fn parse_action(action: &str) -> Result<BulkAction> {
    match action {
        "assign" => Ok(BulkAction::Assign),
        "reset" => Ok(BulkAction::Reset),
        "reassign" => Ok(BulkAction::Reassign),
        other => Err(Error::NotFound(format!("Unknown slot action '{}'", other))),
    }
}

/// `assign`, `reset` or `reassign` for one candidate.
#[utoipa::path(
    post,
    path = "/api/admin/candidates/{id}/slot/{action}",
    params(
        ("id" = i64, Path, description = "Candidate ID"),
        ("action" = String, Path, description = "assign, reset or reassign")
    ),
    responses(
        (status = 200, description = "Updated candidate"),
        (status = 409, description = "Slot already held"),
        (status = 422, description = "Slot guard refused the action")
    )
)]
pub async fn slot_action(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, action)): Path<(i64, String)>,
) -> Result<impl IntoResponse> {
    let by = actor(&claims);
    let profile = match parse_action(&action)? {
        BulkAction::Assign => state.slot_service.assign(id, by).await?,
        BulkAction::Reset => state.slot_service.reset(id).await?,
        BulkAction::Reassign => state.slot_service.reassign(id, by).await?,
    };
    state
        .audit_service
        .record(by, &format!("slot_{}", action), "candidate", Some(id), None)
        .await;
    let trade_code = state.trade_service.find(profile.trade_id).await?.map(|t| t.code);
    Ok(Json(CandidateSummary::new(&profile, trade_code)))
}

#[utoipa::path(
    post,
    path = "/api/admin/slots/bulk/{action}",
    params(("action" = String, Path, description = "assign, reset or reassign")),
    responses((status = 200, description = "Per-candidate success and failure lists"))
)]
pub async fn bulk_slot_action(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(action): Path<String>,
    Json(payload): Json<BulkSlotPayload>,
) -> Result<impl IntoResponse> {
    let bulk = parse_action(&action)?;
    if payload.candidate_ids.is_empty() {
        return Err(Error::BadRequest("candidate_ids must not be empty".to_string()));
    }
    let by = actor(&claims);
    let result = state.slot_service.bulk(bulk, &payload.candidate_ids, by).await;
    state
        .audit_service
        .record(
            by,
            &format!("bulk_slot_{}", action),
            "candidate",
            None,
            Some(json!({ "succeeded": result.succeeded, "failed": result.failed.len() })),
        )
        .await;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/admin/slots/reset-all",
    responses((status = 200, description = "Number of candidates whose slot was cleared"))
)]
pub async fn reset_all_slots(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let count = state.slot_service.reset_all().await?;
    state
        .audit_service
        .record(actor(&claims), "reset_all_slots", "candidate", None, Some(json!({ "count": count })))
        .await;
    Ok(Json(json!({ "reset": count })))
}
