pub mod audit_service;
pub mod auth_service;
pub mod candidate_service;
pub mod csv_processor;
pub mod exam_service;
pub mod export_service;
pub mod maintenance_service;
pub mod paper_service;
pub mod question_import;
pub mod question_service;
pub mod selection;
pub mod slot_service;
pub mod trade_service;
