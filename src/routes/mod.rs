pub mod admin_candidates;
pub mod auth;
pub mod candidate;
pub mod exam;
pub mod export;
pub mod health;
pub mod maintenance;
pub mod openapi;
pub mod papers;
pub mod questions;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::config::get_config;
use crate::middleware::auth::{require_admin, require_candidate, require_oic, Claims};
use crate::middleware::rate_limit::{rps_middleware, RateLimiter};
use crate::AppState;

/// Acting admin for audit entries.
pub(crate) fn actor(claims: &Claims) -> Option<i64> {
    claims.user_id().ok()
}

/// Every API route with its role guard and request budget, state applied.
pub fn router(state: AppState) -> Router {
    let config = get_config();

    let public_api = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/candidate/register", post(candidate::register_candidate))
        .layer(from_fn_with_state(
            RateLimiter::new("public", config.public_rps),
            rps_middleware,
        ));

    let exam_api = Router::new()
        .route("/api/candidate/me", get(candidate::my_profile))
        .route("/api/exam", get(exam::get_exam))
        .route("/api/exam/answers", put(exam::save_answer))
        .route("/api/exam/submit", post(exam::submit_exam))
        .route("/api/exam/status", get(exam::exam_status))
        .layer(from_fn(require_candidate))
        .layer(from_fn_with_state(
            RateLimiter::new("exam", config.public_rps),
            rps_middleware,
        ));

    // Presiding officers and OICs.
    let staff_api = Router::new()
        .route("/api/admin/trades", get(questions::list_trades))
        .route("/api/admin/candidates", get(admin_candidates::list_candidates))
        .route("/api/admin/candidates/:id", get(admin_candidates::get_candidate))
        .route("/api/admin/candidates/:id/marks", put(admin_candidates::update_marks))
        .route("/api/admin/candidates/:id/slot/:action", post(admin_candidates::slot_action))
        .route("/api/admin/slots/bulk/:action", post(admin_candidates::bulk_slot_action))
        .route("/api/admin/export/results.xlsx", get(export::export_results))
        .route("/api/admin/export/marks.xlsx", get(export::export_marks))
        .route("/api/admin/export/answers.csv", get(export::export_answers))
        .route("/api/admin/export/results.dat", get(export::export_dat))
        .route("/api/admin/maintenance/stats", get(maintenance::stats))
        .layer(from_fn(require_admin));

    let oic_api = Router::new()
        .route("/api/admin/users", post(auth::create_admin))
        .route("/api/admin/trades", post(questions::create_trade))
        .route(
            "/api/admin/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route("/api/admin/questions/:id", delete(questions::delete_question))
        .route("/api/admin/questions/:id/active", patch(questions::set_question_active))
        .route("/api/admin/question-uploads", get(questions::list_uploads).post(questions::upload_questions))
        .route("/api/admin/question-sets", get(questions::available_sets))
        .route("/api/admin/papers", get(papers::list_papers))
        .route("/api/admin/papers/:paper_type", patch(papers::update_paper))
        .route(
            "/api/admin/activations",
            get(papers::list_activations).put(papers::upsert_activation),
        )
        .route("/api/admin/candidates/:id", delete(admin_candidates::delete_candidate))
        .route(
            "/api/admin/candidates/:id/primary-bypass",
            put(admin_candidates::set_primary_bypass),
        )
        .route("/api/admin/slots/reset-all", post(admin_candidates::reset_all_slots))
        .route("/api/admin/maintenance/cleanup", post(maintenance::cleanup))
        .route("/api/admin/maintenance/clear-results", post(maintenance::clear_exam_results))
        .route(
            "/api/admin/maintenance/clear-incomplete-sessions",
            post(maintenance::clear_incomplete_sessions),
        )
        .route("/api/admin/audit-logs", get(maintenance::audit_logs))
        .layer(from_fn(require_oic));

    let admin_api = staff_api.merge(oic_api).layer(from_fn_with_state(
        RateLimiter::new("admin", config.admin_rps),
        rps_middleware,
    ));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/openapi.json", get(openapi::openapi_json))
        .merge(public_api)
        .merge(exam_api)
        .merge(admin_api)
        .with_state(state)
}
