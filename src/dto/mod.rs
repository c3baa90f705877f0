pub mod admin_dto;
pub mod auth_dto;
pub mod candidate_dto;
pub mod exam_dto;
