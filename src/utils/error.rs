use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::sync::SessionError;
use crate::utils::response::error as error_response;
use crate::wizard::WizardError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unavailable(msg)
            | AppError::InternalServerError(msg) => msg,
        }
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            error!(code = self.code(), message = %self.message(), "Request failed");
        } else {
            warn!(code = self.code(), message = %self.message(), "Request rejected");
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::NoWizard => AppError::NotFound(message),
            SessionError::WizardOpen => AppError::Conflict(message),
            SessionError::Unmounted => AppError::Unavailable(message),
            SessionError::Wizard(WizardError::Invalid(_) | WizardError::WrongStep { .. }) => {
                AppError::ValidationError(message)
            }
            SessionError::Wizard(
                WizardError::Busy | WizardError::Closed | WizardError::NotSubmitting,
            ) => AppError::Conflict(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        // Internal failures never leak their detail to the client
        let public_message = match &self {
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            other => other.message().to_string(),
        };

        error_response(self.code(), public_message, None, self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::{Step, ValidationError};

    #[test]
    fn test_session_errors_map_to_status() {
        let cases = [
            (SessionError::NoWizard, StatusCode::NOT_FOUND),
            (SessionError::WizardOpen, StatusCode::CONFLICT),
            (SessionError::Unmounted, StatusCode::SERVICE_UNAVAILABLE),
            (
                SessionError::Wizard(WizardError::Invalid(ValidationError::MissingName)),
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionError::Wizard(WizardError::WrongStep {
                    input: Step::Sport,
                    current: Step::Name,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (SessionError::Wizard(WizardError::Busy), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_validation_message_is_public() {
        let err = AppError::from(SessionError::Wizard(WizardError::Invalid(
            ValidationError::MissingSport,
        )));
        assert_eq!(err.message(), "Missing information: Please select a sport for your event");
    }

    #[test]
    fn test_internal_error_response() {
        let response = AppError::InternalServerError("pool exhausted".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
