pub mod activation;
pub mod audit_log;
pub mod candidate;
pub mod exam_session;
pub mod question;
pub mod question_paper;
pub mod trade;
pub mod upload;
pub mod user;
