use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use lending_core::LendingError;
use lending_store::StoreError;
use lending_types::TypeError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Lending(#[from] LendingError),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("authorization denied: {role} may not {action}")]
    AuthorizationDenied { role: String, action: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TypeError> for ServerError {
    fn from(e: TypeError) -> Self {
        Self::Lending(LendingError::Validation(e))
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Lending(e) => match e {
                LendingError::NotFound { .. } => StatusCode::NOT_FOUND,
                LendingError::DuplicateRequest { .. }
                | LendingError::DuplicateLoan { .. }
                | LendingError::AlreadyReturned { .. }
                | LendingError::OutOfStock { .. } => StatusCode::CONFLICT,
                LendingError::NoActiveLoan { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LendingError::InvalidOperation(_) | LendingError::Validation(_) => {
                    StatusCode::BAD_REQUEST
                }
                LendingError::StoreFailure(StoreError::LockTimeout { .. }) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                LendingError::ConsistencyFault(_) | LendingError::StoreFailure(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable snake_case label for the `error` field of the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lending(e) => e.kind(),
            Self::AuthFailed(_) => "unauthenticated",
            Self::AuthorizationDenied { .. } => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
