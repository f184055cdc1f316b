// src/auth/validators.rs

use super::models::{ChangePasswordRequest, RegisterRequest};
use crate::common::validation::is_plausible_email;
use crate::common::{ValidationResult, Validator};

pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 128;
pub const MAX_NAME_CHARS: usize = 100;

fn check_password(result: &mut ValidationResult, field: &str, password: &str) {
    let chars = password.chars().count();
    if chars < MIN_PASSWORD_CHARS {
        result.add_error(field, "Password must be at least 6 characters");
    } else if chars > MAX_PASSWORD_CHARS {
        result.add_error(field, "Password must be at most 128 characters");
    }
}

pub struct RegisterValidator;

impl Validator<RegisterRequest> for RegisterValidator {
    fn validate(&self, data: &RegisterRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.email.trim().is_empty() {
            result.add_error("email", "Email is required");
        } else if !is_plausible_email(&data.email) {
            result.add_error("email", "Email must be a valid address");
        }

        check_password(&mut result, "password", &data.password);

        if let Some(name) = &data.name {
            if name.chars().count() > MAX_NAME_CHARS {
                result.add_error("name", "Name must be at most 100 characters");
            }
        }

        result
    }
}

pub struct PasswordChangeValidator;

impl Validator<ChangePasswordRequest> for PasswordChangeValidator {
    fn validate(&self, data: &ChangePasswordRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_password(&mut result, "new_password", &data.new_password);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str, name: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_register_accepts_short_but_valid_password() {
        let result = RegisterValidator.validate(&register("bob@example.com", "hunter2", None));
        assert!(result.is_valid);
    }

    #[test]
    fn test_register_collects_every_problem() {
        let long_name = "n".repeat(101);
        let result = RegisterValidator.validate(&register("bob", "123", Some(&long_name)));

        assert!(!result.is_valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password", "name"]);
    }

    #[test]
    fn test_password_upper_bound() {
        let request = ChangePasswordRequest {
            current_password: None,
            new_password: "x".repeat(129),
        };
        assert!(!PasswordChangeValidator.validate(&request).is_valid);
    }
}
