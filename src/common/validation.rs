// Common validation types and traits

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.is_valid = false;
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Validator<T> {
    fn validate(&self, data: &T) -> ValidationResult;
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plausible_emails() {
        assert!(is_plausible_email("bob@example.com"));
        assert!(is_plausible_email(" a@x.io "));
        assert!(!is_plausible_email("bob@"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("bob@localhost"));
        assert!(!is_plausible_email("bob@@example.com"));
        assert!(!is_plausible_email("bo b@example.com"));
    }

    #[test]
    fn test_validation_result_collects_errors() {
        let mut result = ValidationResult::new();
        assert!(result.is_valid);
        result.add_error("email", "Email is required");
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "email");
    }
}
