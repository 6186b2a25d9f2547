//! Error model for bookshelf.
//!
//! Each component has its own `thiserror` enum (`LookupError` for the
//! classification client, `StoreError` for SQLite-backed stores, `AuthError`
//! for the credential and session gate). Handlers convert them into the
//! HTTP-facing `AppError`, which knows its status code and renders itself as a
//! small JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failures talking to the external classification service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The service answered but carried no work record for the identifier.
    #[error("no work found for '{0}'")]
    NotFound(String),
    /// The response body could not be decoded into the expected shape.
    #[error("malformed classify response: {0}")]
    Malformed(String),
    /// Connection refused, timeout, or non-success HTTP status.
    #[error("classify service unavailable: {0}")]
    Unavailable(String),
}

/// Failures from the SQLite-backed stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Failures of the login/registration flow and the session gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("username '{0}' already exists")]
    AlreadyExists(String),
    #[error("session no longer refers to an existing user")]
    SessionExpired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Text suitable for showing on the login form.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::AlreadyExists(_) => "Username already exists",
            AuthError::InvalidCredentials => "Invalid username or password",
            AuthError::SessionExpired => "Your session has expired, please log in again",
            AuthError::Store(_) => "Login is temporarily unavailable",
        }
    }
}

/// What kind of failure an `AppError` is; decides the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Unauthorized,
    Upstream,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error returned by handlers: a kind, a stable machine code and a message.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, code: code.into(), message: message.into() }
    }

    /// Bad input from the client.
    pub fn user(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, code, message)
    }

    pub fn http_status(&self) -> StatusCode {
        self.kind.status()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        let (kind, code) = match err {
            LookupError::NotFound(_) => (ErrorKind::NotFound, "work_not_found"),
            LookupError::Malformed(_) => (ErrorKind::Upstream, "classify_malformed"),
            LookupError::Unavailable(_) => (ErrorKind::Upstream, "classify_unavailable"),
        };
        AppError::new(kind, code, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let (kind, code) = match err {
            StoreError::NotFound(_) => (ErrorKind::NotFound, "not_found"),
            StoreError::Conflict(_) => (ErrorKind::Conflict, "conflict"),
            StoreError::Unavailable(_) => (ErrorKind::Unavailable, "store_unavailable"),
        };
        AppError::new(kind, code, err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let (kind, code) = match err {
            AuthError::Store(e) => return e.into(),
            AuthError::InvalidCredentials => (ErrorKind::Unauthorized, "invalid_credentials"),
            AuthError::AlreadyExists(_) => (ErrorKind::Conflict, "already_exists"),
            AuthError::SessionExpired => (ErrorKind::Unauthorized, "session_expired"),
        };
        AppError::new(kind, code, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = serde_json::json!({
            "status": "error",
            "code": self.code,
            "error": self.message,
        });
        (status, Json(body)).into_response()
    }
}
