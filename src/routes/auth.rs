use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;
use validator::Validate;

use crate::{
    dto::auth_dto::{CreateAdminPayload, LoginPayload, LoginResponse},
    error::Result,
    middleware::auth::Claims,
    routes::actor,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/auth/login",
    responses(
        (status = 200, description = "Signed bearer token"),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> Result<impl IntoResponse> {
    payload.validate()?;
    let (token, user) = state.auth_service.login(&payload.username, &payload.password).await?;
    let role = user
        .role()
        .ok_or_else(|| crate::error::Error::Internal("Unknown role".to_string()))?;
    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        role,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    responses(
        (status = 201, description = "Admin account created"),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAdminPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let user = state
        .auth_service
        .create_admin(&payload.username, &payload.password, payload.role)
        .await?;
    state
        .audit_service
        .record(actor(&claims), "create_admin", "user", Some(user.id), Some(json!({ "role": user.role })))
        .await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": user.id, "username": user.username, "role": user.role })),
    ))
}
