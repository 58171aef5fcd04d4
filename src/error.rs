use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::auth::policy::DenyReason;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("server configuration error: {0}")]
    Config(&'static str),
    #[error("missing or malformed Authorization header")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user not found")]
    NotFound,
    #[error("email already in use")]
    DuplicateEmail,
    #[error("{0}")]
    Validation(String),
    #[error("access denied: {0}")]
    Denied(DenyReason),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::MissingToken | AppError::InvalidToken | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::DuplicateEmail => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Denied(_) => StatusCode::FORBIDDEN,
        }
    }
}

// Malformed bodies, query strings and path segments are client input errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Config(what) => {
                error!(what, "server misconfigured");
                json!({ "error": "server configuration error" })
            }
            AppError::Database(e) => {
                error!(error = %e, "database error");
                json!({ "error": "internal server error" })
            }
            AppError::Internal(e) => {
                error!(error = %e, "internal error");
                json!({ "error": "internal server error" })
            }
            AppError::Denied(reason) => {
                json!({ "error": "access denied", "details": reason.message() })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(AppError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::DuplicateEmail.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Denied(DenyReason::NotAdmin).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn missing_secret_is_a_server_error() {
        let res = AppError::Config("JWT_SECRET is not set").into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
