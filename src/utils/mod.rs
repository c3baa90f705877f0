pub mod crypto;
pub mod dat;
pub mod time;
pub mod token;
pub mod validation;
