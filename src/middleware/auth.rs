use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::models::user::Role;
use crate::utils::token::decode_token;

pub use crate::utils::token::Claims;

fn unauthorized(code: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": code }))).into_response()
}

/// Validates the bearer token and checks its role against `allowed`.
/// Inserts the `Claims` extension.
pub async fn require_roles(mut req: Request, next: Next, allowed: &[Role]) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return unauthorized("missing_authorization");
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return unauthorized("bad_authorization");
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return unauthorized("unsupported_scheme");
    };

    let config = crate::config::get_config();
    match decode_token(token, &config.jwt_secret) {
        Ok(claims) => {
            if !allowed.contains(&claims.role) {
                tracing::debug!(role = %claims.role, path = %req.uri().path(), "role refused");
                return (StatusCode::FORBIDDEN, Json(json!({"error":"forbidden"}))).into_response();
            }
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(_) => unauthorized("invalid_token"),
    }
}

/// OIC or presiding officer.
pub async fn require_admin(req: Request, next: Next) -> Response {
    require_roles(req, next, &[Role::OicAdmin, Role::PoAdmin]).await
}

pub async fn require_oic(req: Request, next: Next) -> Response {
    require_roles(req, next, &[Role::OicAdmin]).await
}

pub async fn require_candidate(req: Request, next: Next) -> Response {
    require_roles(req, next, &[Role::Candidate]).await
}
