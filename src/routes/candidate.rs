use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};

use crate::{
    dto::candidate_dto::{CandidateSummary, RegisterCandidatePayload},
    error::Result,
    middleware::auth::Claims,
    AppState,
};

pub async fn register_candidate(
    State(state): State<AppState>,
    Json(payload): Json<RegisterCandidatePayload>,
) -> Result<impl IntoResponse> {
    let profile = state.candidate_service.register(&payload).await?;
    let trade = state.trade_service.find(profile.trade_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CandidateSummary::new(&profile, trade.map(|t| t.code))),
    ))
}

/// The signed-in candidate's own profile.
pub async fn my_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let profile = state.candidate_service.get_by_user(claims.user_id()?).await?;
    Ok(Json(profile))
}
