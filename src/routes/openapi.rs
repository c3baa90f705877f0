use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::routes::{admin_candidates, auth, export, maintenance, papers, questions};

#[derive(OpenApi)]
#[openapi(
    info(title = "Trade Exam Portal API"),
    paths(
        auth::login,
        auth::create_admin,
        questions::list_trades,
        questions::create_trade,
        questions::list_questions,
        questions::create_question,
        questions::set_question_active,
        questions::delete_question,
        questions::upload_questions,
        questions::list_uploads,
        questions::available_sets,
        papers::list_papers,
        papers::update_paper,
        papers::list_activations,
        papers::upsert_activation,
        admin_candidates::list_candidates,
        admin_candidates::get_candidate,
        admin_candidates::delete_candidate,
        admin_candidates::update_marks,
        admin_candidates::set_primary_bypass,
        admin_candidates::slot_action,
        admin_candidates::bulk_slot_action,
        admin_candidates::reset_all_slots,
        export::export_results,
        export::export_marks,
        export::export_answers,
        export::export_dat,
        maintenance::cleanup,
        maintenance::clear_exam_results,
        maintenance::clear_incomplete_sessions,
        maintenance::stats,
        maintenance::audit_logs,
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
