//! Request validation from config rules. Failures are collected, not short-circuited.

use crate::config::ValidationRule;
use crate::error::{AppError, FieldError};
use regex::Regex;
use serde_json::Value;

/// Numeric codes carried by each `FieldError`.
pub mod codes {
    pub const REQUIRED: u32 = 1001;
    pub const TYPE: u32 = 1002;
    pub const EMAIL: u32 = 1003;
    pub const UUID: u32 = 1004;
    pub const DATE_TIME: u32 = 1005;
    pub const MIN_LENGTH: u32 = 1006;
    pub const MAX_LENGTH: u32 = 1007;
    pub const PATTERN: u32 = 1008;
    pub const ALLOWED: u32 = 1009;
    pub const MINIMUM: u32 = 1010;
    pub const MAXIMUM: u32 = 1011;
    pub const UNRESOLVED_REFERENCE: u32 = 1012;
}

#[derive(Debug, Default)]
pub struct RequestValidator {
    errors: Vec<FieldError>,
}

impl RequestValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: u32, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(code, field, message));
    }

    pub fn required(&mut self, field: &str) {
        self.push(codes::REQUIRED, field, format!("{} is required", field));
    }

    /// `Err(AppError::Validation)` carrying every collected error.
    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }

    /// Apply the rule to a present value. Null passes; `required` is checked by the caller.
    pub fn check(&mut self, field: &str, v: &Value, rule: &ValidationRule) {
        if v.is_null() {
            return;
        }
        if let Some(format) = &rule.format {
            self.check_format(field, v, format);
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            if let Some(max) = rule.max_length {
                if len > max as usize {
                    self.push(
                        codes::MAX_LENGTH,
                        field,
                        format!("{} must be at most {} characters", field, max),
                    );
                }
            }
            if let Some(min) = rule.min_length {
                if len < min as usize {
                    self.push(
                        codes::MIN_LENGTH,
                        field,
                        format!("{} must be at least {} characters", field, min),
                    );
                }
            }
            if let Some(pattern) = &rule.pattern {
                match Regex::new(pattern) {
                    Ok(re) if re.is_match(s) => {}
                    Ok(_) => self.push(codes::PATTERN, field, format!("{} does not match required pattern", field)),
                    Err(_) => self.push(codes::PATTERN, field, format!("invalid pattern for {}", field)),
                }
            }
        }
        if let Some(allowed) = &rule.allowed {
            if !allowed.iter().any(|a| value_eq(v, a)) {
                self.push(
                    codes::ALLOWED,
                    field,
                    format!(
                        "{} must be one of: {:?}",
                        field,
                        allowed.iter().take(5).collect::<Vec<_>>()
                    ),
                );
            }
        }
        if let Some(n) = v.as_f64() {
            if let Some(min) = rule.minimum {
                if n < min {
                    self.push(codes::MINIMUM, field, format!("{} must be at least {}", field, min));
                }
            }
            if let Some(max) = rule.maximum {
                if n > max {
                    self.push(codes::MAXIMUM, field, format!("{} must be at most {}", field, max));
                }
            }
        }
    }

    fn check_format(&mut self, field: &str, v: &Value, format: &str) {
        let Some(s) = v.as_str() else {
            return;
        };
        match format.to_lowercase().as_str() {
            "email" => {
                let valid = s
                    .split_once('@')
                    .map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.'));
                if !valid {
                    self.push(codes::EMAIL, field, format!("{} must be a valid email", field));
                }
            }
            "uuid" => {
                if uuid::Uuid::parse_str(s).is_err() {
                    self.push(codes::UUID, field, format!("{} must be a valid UUID", field));
                }
            }
            "date-time" => {
                if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                    self.push(codes::DATE_TIME, field, format!("{} must be an RFC 3339 date-time", field));
                }
            }
            _ => {}
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_every_failure() {
        let rule = ValidationRule {
            format: Some("email".into()),
            max_length: Some(5),
            ..Default::default()
        };
        let mut v = RequestValidator::new();
        v.check("email", &json!("not-an-email"), &rule);
        let Err(AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation errors");
        };
        let codes: Vec<u32> = errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![codes::EMAIL, codes::MAX_LENGTH]);
    }

    #[test]
    fn numeric_bounds_and_allowed_values() {
        let rule = ValidationRule {
            minimum: Some(1.0),
            maximum: Some(10.0),
            allowed: Some(vec![json!(1), json!(20)]),
            ..Default::default()
        };
        let mut v = RequestValidator::new();
        v.check("n", &json!(1.0), &rule);
        v.finish().unwrap();
        let mut v = RequestValidator::new();
        v.check("n", &json!(20), &rule);
        let Err(AppError::Validation(errors)) = v.finish() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors[0].code, codes::MAXIMUM);
    }

    #[test]
    fn null_skips_rules() {
        let rule = ValidationRule {
            min_length: Some(3),
            ..Default::default()
        };
        let mut v = RequestValidator::new();
        v.check("title", &Value::Null, &rule);
        v.finish().unwrap();
    }
}
