use validator::{Validate, ValidationError};

pub fn validate<T: Validate>(val: &T) -> Result<(), validator::ValidationErrors> {
    val.validate()
}

fn exact_digits(value: &str, len: usize, code: &'static str) -> Result<(), ValidationError> {
    if value.len() == len && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new(code);
        err.message = Some(format!("must be exactly {} digits", len).into());
        Err(err)
    }
}

pub fn validate_aadhaar(value: &str) -> Result<(), ValidationError> {
    exact_digits(value, 12, "aadhaar")
}

pub fn validate_apaar(value: &str) -> Result<(), ValidationError> {
    exact_digits(value, 12, "apaar")
}

pub fn validate_mobile(value: &str) -> Result<(), ValidationError> {
    exact_digits(value, 10, "mobile")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_rules() {
        assert!(validate_aadhaar("123456789012").is_ok());
        assert!(validate_aadhaar("12345678901").is_err());
        assert!(validate_aadhaar("12345678901a").is_err());
        assert!(validate_mobile("9876543210").is_ok());
        assert!(validate_mobile("+919876543210").is_err());
    }
}
