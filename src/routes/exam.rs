use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};

use crate::{
    dto::exam_dto::{SaveAnswerPayload, SubmitPayload},
    error::Result,
    middleware::auth::Claims,
    AppState,
};

pub async fn get_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let view = state.exam_service.begin(claims.user_id()?).await?;
    Ok(Json(view))
}

pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SaveAnswerPayload>,
) -> Result<impl IntoResponse> {
    state
        .exam_service
        .save_answer(claims.user_id()?, payload.question_id, payload.answer)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn submit_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitPayload>,
) -> Result<impl IntoResponse> {
    let result = state.exam_service.submit(claims.user_id()?, &payload).await?;
    Ok(Json(result))
}

pub async fn exam_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let status = state.exam_service.status(claims.user_id()?).await?;
    Ok(Json(status))
}
