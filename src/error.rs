//! # Error Handling
//!
//! [`AppError`] is what handlers and interceptors return when a request cannot be
//! served normally. Converting it into a response is the only place that decides
//! between "tell the client what went wrong" (4xx) and "log everything, tell the
//! client nothing" (5xx).
//!
//! ## Response bodies
//! Every error body is the plain-text reason phrase of its status code
//! (`Not Found`, `Bad Request`, `Internal Server Error`). Internal detail never
//! reaches the client; it goes to the log together with a backtrace.

use std::backtrace::Backtrace;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::ModelError;
use crate::session::SessionError;

/// Application-wide error type
///
/// Client-side variants (`NotFound`, `BadRequest`) are expected outcomes and are not
/// logged as faults. All other variants become a 500.
#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown route, unknown id, or an expired snippet
    #[error("not found")]
    NotFound,

    /// Malformed input or a failed CSRF check
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Store failure other than the expected conditions handled by callers
    #[error("store error: {0}")]
    Model(#[from] ModelError),

    /// Session load, persist or (de)serialization failure
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Template lookup or execution failure
    #[error("template error: {0}")]
    Template(String),

    /// Anything else that shouldn't happen
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Model(ModelError::NoRecord) => StatusCode::NOT_FOUND,
            AppError::Model(_)
            | AppError::Session(_)
            | AppError::Template(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A bare status response whose body is the status reason phrase
pub fn status_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (
        status,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        format!("{}\n", reason),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                backtrace = %Backtrace::capture(),
                "server error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "client error");
        }

        status_response(status)
    }
}

pub type AppResult<T> = Result<T, AppError>;
