//! Typed errors and HTTP mapping.

use crate::response::{pretty_json, X_RESOURCE_IDENTIFIER};
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Startup failures. None of these are recoverable at request time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("recursion limit of {limit} reached while reflecting '{type_name}'")]
    RecursionLimit { type_name: String, limit: usize },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("resource '{identifier}' already exists")]
    Conflict { identifier: String },
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub code: u32,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(code: u32, field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            code,
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("resource '{identifier}' already exists")]
    Conflict { identifier: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    /// Raised by domain code that picks its own status.
    #[error("{message}")]
    Application {
        status: u16,
        code: u32,
        message: String,
    },
    #[error(transparent)]
    Store(StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { identifier } => AppError::Conflict { identifier },
            other => AppError::Store(other),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(StoreError::Database(e))
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// An error after translation, ready to become a response.
#[derive(Debug)]
pub struct TranslatedError {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub envelope: ErrorEnvelope,
}

impl IntoResponse for TranslatedError {
    fn into_response(self) -> Response {
        let mut response = pretty_json(self.status, &self.envelope);
        response.headers_mut().extend(self.headers);
        response
    }
}

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Opaque correlation code: timestamp plus six random hex digits.
pub fn reference_code() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        &random[..6]
    )
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Application { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            AppError::Config(_) | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Store(_) | AppError::Internal(_)
        )
    }

    /// Map to status, headers and envelope. Internal messages are replaced by a
    /// generic one unless `expose_internal` is set; the reference code is logged
    /// alongside the real error either way.
    pub fn translate(self, expose_internal: bool) -> TranslatedError {
        let status = self.status();
        let mut headers = HeaderMap::new();

        if let AppError::Validation(errors) = self {
            tracing::warn!(
                fields = ?errors.iter().map(|e| e.field.as_str()).collect::<Vec<_>>(),
                "validation failed"
            );
            return TranslatedError {
                status,
                headers,
                envelope: ErrorEnvelope {
                    code: u32::from(status.as_u16()),
                    message: "Validation failed".into(),
                    reference: None,
                    errors: Some(errors),
                },
            };
        }

        let reference = reference_code();
        if status.is_server_error() {
            tracing::error!(reference = %reference, error = %self, "request failed");
        } else {
            tracing::debug!(reference = %reference, error = %self, "request rejected");
        }

        if let AppError::Conflict { identifier } = &self {
            if let Ok(v) = HeaderValue::from_str(identifier) {
                headers.insert(X_RESOURCE_IDENTIFIER, v);
            }
        }

        let code = match &self {
            AppError::Application { code, .. } => *code,
            _ => u32::from(status.as_u16()),
        };
        let message = if self.is_internal() && !expose_internal {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        TranslatedError {
            status,
            headers,
            envelope: ErrorEnvelope {
                code,
                message,
                reference: Some(reference),
                errors: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.translate(false).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_errors_keep_their_status_and_code() {
        let err = AppError::Application {
            status: 418,
            code: 1_500_000_001,
            message: "teapot".into(),
        };
        let t = err.translate(false);
        assert_eq!(t.status.as_u16(), 418);
        assert_eq!(t.envelope.code, 1_500_000_001);
        assert_eq!(t.envelope.message, "teapot");
        assert!(t.envelope.reference.is_some());
    }

    #[test]
    fn out_of_range_application_status_falls_back_to_500() {
        let err = AppError::Application {
            status: 9001,
            code: 9001,
            message: "over".into(),
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_messages_are_redacted_unless_exposed() {
        let redacted = AppError::Internal("secret path /etc".into()).translate(false);
        assert_eq!(redacted.envelope.message, INTERNAL_MESSAGE);
        let exposed = AppError::Internal("secret path /etc".into()).translate(true);
        assert!(exposed.envelope.message.contains("secret path"));
    }

    #[test]
    fn conflict_surfaces_identifier_header() {
        let t = AppError::Conflict {
            identifier: "abc".into(),
        }
        .translate(false);
        assert_eq!(t.status, StatusCode::CONFLICT);
        assert_eq!(t.headers.get(X_RESOURCE_IDENTIFIER).unwrap(), "abc");
    }

    #[test]
    fn validation_envelope_lists_field_errors() {
        let t = AppError::Validation(vec![FieldError::new(1003, "email", "invalid")])
            .translate(false);
        assert_eq!(t.status, StatusCode::UNPROCESSABLE_ENTITY);
        let errors = t.envelope.errors.unwrap();
        assert_eq!(errors[0].field, "email");
        assert!(t.envelope.reference.is_none());
    }

    #[test]
    fn store_conflict_becomes_app_conflict() {
        let e: AppError = StoreError::Conflict {
            identifier: "x".into(),
        }
        .into();
        assert!(matches!(e, AppError::Conflict { identifier } if identifier == "x"));
    }
}
