// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use movie_auth_api::ErrorResponse;

use crate::auth::error::AuthError;
use crate::auth::reset::FlowError;
use crate::auth::tokens::TokenError;
use crate::db::error::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // === Repository ===
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(String),

    // === Authentication ===
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("No token provided")]
    MissingToken,

    // === Request ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized: {0}")]
    UnauthorizedAction(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // === Internal ===
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, internal_detail) = self.get_error_info();

        if let Some(ref detail) = internal_detail {
            tracing::error!(error_code, %status, detail, "request failed");
        }

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details: self.details(),
        });

        (status, body).into_response()
    }
}

impl AppError {
    fn get_error_info(&self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            AppError::Auth(err) => Self::auth_error_info(err),
            AppError::Token(err) => Self::token_error_info(err),
            AppError::Flow(FlowError::Validation(err)) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                err.to_string(),
                None,
            ),
            AppError::Flow(FlowError::Auth(err)) => Self::auth_error_info(err),
            AppError::Flow(err @ FlowError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string(), None)
            }

            // 404 Not Found
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),

            // 401 / 403
            AppError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "MISSING_TOKEN",
                "Authentication required".to_string(),
                None,
            ),
            AppError::UnauthorizedAction(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),

            // 400 Bad Request
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone(), None)
            }

            // 500 Internal Server Error
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "An error occurred with the database".to_string(),
                Some(msg.clone()),
            ),
            AppError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                Some(msg.clone()),
            ),
        }
    }

    fn auth_error_info(err: &AuthError) -> (StatusCode, &'static str, String, Option<String>) {
        let status = match err {
            AuthError::Validation(_)
            | AuthError::SamePassword
            | AuthError::InvalidNonce
            | AuthError::InvalidLink(_)
            | AuthError::Rejected(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::ReauthenticationRequired
            | AuthError::SessionExpired
            | AuthError::SessionRevoked => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotConfirmed => StatusCode::FORBIDDEN,
            AuthError::UserAlreadyRegistered => StatusCode::CONFLICT,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Unexpected { .. } => StatusCode::BAD_GATEWAY,
        };
        let detail = match err {
            AuthError::Unexpected { detail } => Some(detail.clone()),
            _ => None,
        };
        (status, err.code(), err.to_string(), detail)
    }

    fn token_error_info(err: &TokenError) -> (StatusCode, &'static str, String, Option<String>) {
        match err {
            TokenError::Expired => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                err.to_string(),
                None,
            ),
            TokenError::Revoked => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_REVOKED",
                err.to_string(),
                None,
            ),
            TokenError::Invalid | TokenError::NotRevocable => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                err.to_string(),
                None,
            ),
            TokenError::Jwt(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOKEN_ERROR",
                "An error occurred while generating token".to_string(),
                Some(e.to_string()),
            ),
            TokenError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "An error occurred with the database".to_string(),
                Some(e.to_string()),
            ),
        }
    }

    /// Form field of a validation error, for inline display.
    fn details(&self) -> Option<String> {
        match self {
            AppError::Auth(AuthError::Validation(err))
            | AppError::Flow(FlowError::Validation(err)) => Some(err.field().to_string()),
            _ => None,
        }
    }

    // === Helper constructors ===
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        AppError::DatabaseError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::InternalServerError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::UnauthorizedAction(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        self.get_error_info().0
    }

    pub fn error_code(&self) -> &'static str {
        self.get_error_info().1
    }
}

// === Conversions from other error types ===

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::not_found(msg),
            RepositoryError::UniqueViolation(msg)
            | RepositoryError::PoolError(msg)
            | RepositoryError::ForeignKeyViolation(msg)
            | RepositoryError::DatabaseError(msg)
            | RepositoryError::TaskFailed(msg) => AppError::database(msg),
        }
    }
}

impl From<crate::auth::password::ValidationError> for AppError {
    fn from(err: crate::auth::password::ValidationError) -> Self {
        AppError::Auth(err.into())
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::invalid_input(format!("Invalid JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{PasswordRule, ValidationError};

    async fn body_of(err: AppError) -> (StatusCode, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn not_found_displays_correct_message() {
        let err = AppError::not_found("Profile");
        assert_eq!(err.to_string(), "Not found: Profile");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::UserAlreadyRegistered).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(AuthError::RateLimited).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::from(AuthError::SamePassword).error_code(),
            "SAME_PASSWORD"
        );
    }

    #[test]
    fn token_errors_are_unauthorized() {
        assert_eq!(
            AppError::from(TokenError::Revoked).error_code(),
            "TOKEN_REVOKED"
        );
        assert_eq!(
            AppError::from(TokenError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn invalid_transition_is_a_conflict() {
        let err = AppError::from(FlowError::InvalidTransition {
            from: "success",
            action: "submit a new password",
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn validation_error_body_names_the_field() {
        let (status, body) = body_of(AppError::from(ValidationError::WeakPassword(
            PasswordRule::MinLength,
        )))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "VALIDATION_ERROR");
        assert_eq!(body.message, "Password must be at least 8 characters");
        assert_eq!(body.details.as_deref(), Some("password"));
    }

    #[tokio::test]
    async fn unexpected_detail_is_not_leaked() {
        let (status, body) =
            body_of(AppError::from(AuthError::unexpected("connect ECONNREFUSED 10.0.0.1"))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.message, "An unexpected error occurred. Please try again");
        assert!(body.details.is_none());
    }
}
