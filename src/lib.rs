pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    audit_service::AuditService, auth_service::AuthService, candidate_service::CandidateService,
    exam_service::ExamService, export_service::ExportService, maintenance_service::MaintenanceService,
    paper_service::PaperService, question_service::QuestionService, slot_service::SlotService,
    trade_service::TradeService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub auth_service: AuthService,
    pub trade_service: TradeService,
    pub candidate_service: CandidateService,
    pub paper_service: PaperService,
    pub question_service: QuestionService,
    pub slot_service: SlotService,
    pub exam_service: ExamService,
    pub export_service: ExportService,
    pub maintenance_service: MaintenanceService,
    pub audit_service: AuditService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            auth_service: AuthService::new(pool.clone()),
            trade_service: TradeService::new(pool.clone()),
            candidate_service: CandidateService::new(pool.clone()),
            paper_service: PaperService::new(pool.clone()),
            question_service: QuestionService::new(pool.clone()),
            slot_service: SlotService::new(pool.clone()),
            exam_service: ExamService::new(pool.clone()),
            export_service: ExportService::new(pool.clone()),
            maintenance_service: MaintenanceService::new(
                pool.clone(),
                config::get_config().default_exam_duration_minutes,
            ),
            audit_service: AuditService::new(pool.clone()),
            pool,
        }
    }
}
