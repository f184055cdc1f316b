// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::error;

use super::validation::ValidationResult;

/// API error types
///
/// Each authentication outcome the caller must react to differently has its
/// own variant, so the kind survives all the way to the HTTP boundary.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),
    DatabaseError(sqlx::Error),
    ValidationError(String),
    /// Provider network failure or timeout; the browser may re-initiate login.
    ProviderUnavailable(String),
    /// Provider answered, but not with something usable.
    ProviderError(String),
    ProviderMisconfigured(String),
    AuthorizationDenied(String),
    StateMismatch,
    StaleState,
    AmbiguousIdentity { message: String, link_ticket: Option<String> },
    InvalidCredential,
    ExpiredCredential,
    RevokedCredential,
    /// Wrong email/password pair. Deliberately says nothing about which half was wrong.
    InvalidLogin,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::ProviderUnavailable(msg) => write!(f, "Provider Unavailable: {}", msg),
            ApiError::ProviderError(msg) => write!(f, "Provider Error: {}", msg),
            ApiError::ProviderMisconfigured(msg) => write!(f, "Provider Misconfigured: {}", msg),
            ApiError::AuthorizationDenied(msg) => write!(f, "Authorization Denied: {}", msg),
            ApiError::StateMismatch => write!(f, "OAuth state mismatch"),
            ApiError::StaleState => write!(f, "Stale authorization attempt"),
            ApiError::AmbiguousIdentity { message, .. } => {
                write!(f, "Ambiguous Identity: {}", message)
            }
            ApiError::InvalidCredential => write!(f, "Invalid credential"),
            ApiError::ExpiredCredential => write!(f, "Expired credential"),
            ApiError::RevokedCredential => write!(f, "Revoked credential"),
            ApiError::InvalidLogin => write!(f, "Invalid email or password"),
        }
    }
}

impl std::error::Error for ApiError {}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_ticket: Option<String>,
}

impl ApiError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServer(_) => "INTERNAL_SERVER_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            ApiError::ProviderError(_) => "PROVIDER_ERROR",
            ApiError::ProviderMisconfigured(_) => "PROVIDER_MISCONFIGURED",
            ApiError::AuthorizationDenied(_) => "AUTHORIZATION_DENIED",
            ApiError::StateMismatch => "STATE_MISMATCH",
            ApiError::StaleState => "STALE_STATE",
            ApiError::AmbiguousIdentity { .. } => "AMBIGUOUS_IDENTITY",
            ApiError::InvalidCredential => "INVALID_CREDENTIAL",
            ApiError::ExpiredCredential => "EXPIRED_CREDENTIAL",
            ApiError::RevokedCredential => "REVOKED_CREDENTIAL",
            ApiError::InvalidLogin => "INVALID_LOGIN",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_)
            | ApiError::AuthorizationDenied(_)
            | ApiError::InvalidCredential
            | ApiError::ExpiredCredential
            | ApiError::RevokedCredential
            | ApiError::InvalidLogin => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_)
            | ApiError::ValidationError(_)
            | ApiError::StateMismatch
            | ApiError::StaleState => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::AmbiguousIdentity { .. } => StatusCode::CONFLICT,
            ApiError::ProviderUnavailable(_) | ApiError::ProviderError(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::InternalServer(_)
            | ApiError::DatabaseError(_)
            | ApiError::ProviderMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let code = self.code().to_string();

        let (error_message, link_ticket) = match self {
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                ("Database operation failed".to_string(), None)
            }
            ApiError::AmbiguousIdentity {
                message,
                link_ticket,
            } => (message, link_ticket),
            ApiError::Unauthorized(msg)
            | ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServer(msg)
            | ApiError::ValidationError(msg)
            | ApiError::ProviderUnavailable(msg)
            | ApiError::ProviderError(msg)
            | ApiError::ProviderMisconfigured(msg)
            | ApiError::AuthorizationDenied(msg) => (msg, None),
            other => (other.to_string(), None),
        };

        let error_response = ErrorResponse {
            error: error_message,
            code,
            link_ticket,
        };

        (status, Json(error_response)).into_response()
    }
}

/// Helper function to convert ValidationResult to ApiError
impl From<ValidationResult> for ApiError {
    fn from(result: ValidationResult) -> Self {
        if result.is_valid {
            ApiError::InternalServer(
                "Validation result was valid but converted to error".to_string(),
            )
        } else {
            let error_messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            ApiError::ValidationError(error_messages.join(", "))
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::DatabaseError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_have_distinct_codes() {
        let codes = [
            ApiError::InvalidCredential.code(),
            ApiError::ExpiredCredential.code(),
            ApiError::RevokedCredential.code(),
        ];
        assert_eq!(codes, ["INVALID_CREDENTIAL", "EXPIRED_CREDENTIAL", "REVOKED_CREDENTIAL"]);
        assert_eq!(ApiError::ExpiredCredential.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_oauth_failures_map_to_documented_statuses() {
        assert_eq!(ApiError::StateMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::StaleState.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::AuthorizationDenied("access_denied".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::ProviderMisconfigured("github".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_ambiguous_identity_body_carries_ticket() {
        let err = ApiError::AmbiguousIdentity {
            message: "confirm".into(),
            link_ticket: Some("tkt".into()),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "AMBIGUOUS_IDENTITY");
        assert_eq!(body["link_ticket"], "tkt");
    }
}
