use axum::{
    Json,
    extract::{
        Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AppConfig, Env};

/// StoreError
///
/// Outcome of a failed record-store operation. A missing record is never an
/// error at this level: lookups return `Option` and deletes return `bool`, so
/// "not found" stays distinguishable from a rejected write.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (e.g. a second user with the same email).
    #[error("duplicate value for unique field `{field}`")]
    Duplicate { field: &'static str },
    /// The store refused the document shape or value.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Connection, protocol or driver failure.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// AppError
///
/// The tagged error kinds surfaced by the HTTP layer. Every kind knows its
/// HTTP status and its JSend-style class (`fail` for client-caused 4xx,
/// `error` for server-caused 5xx).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Please provide email and password!")]
    MissingCredentials,

    #[error("Email address is already in use")]
    DuplicateEmail,

    /// Wrong email and wrong password share this single message.
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("You are not logged in! Please log in to get access.")]
    Unauthenticated,

    #[error("Invalid or expired token. Please log in again.")]
    InvalidToken,

    #[error("The user belonging to this token does no longer exist.")]
    UserGone,

    #[error("User recently changed password! Please log in again.")]
    PasswordChanged,

    #[error("You do not have permission to access this resource.")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("record store failure")]
    Store(#[source] StoreError),

    #[error("internal failure: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field: "email" } => AppError::DuplicateEmail,
            StoreError::Validation(message) => AppError::Validation(message),
            other => AppError::Store(other),
        }
    }
}

/// A body that is not JSON, or does not fit the payload type, is a client
/// validation failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// An id segment that does not parse can never resolve to a record.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(inner) => {
                tracing::debug!(reason = %inner.body_text(), "unresolvable path id");
                AppError::NotFound("Record")
            }
            other => AppError::Internal(other.body_text()),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingCredentials | AppError::DuplicateEmail => {
                StatusCode::BAD_REQUEST
            }
            AppError::InvalidCredentials
            | AppError::Unauthenticated
            | AppError::InvalidToken
            | AppError::UserGone
            | AppError::PasswordChanged => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `fail` for client errors, `error` for server errors.
    pub fn status(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    /// The message safe to show any client. Server-side failures collapse
    /// into a generic sentence.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "Something went very wrong!".to_string()
        } else {
            self.to_string()
        }
    }

    /// Full diagnostic chain, only ever shown outside production.
    fn detail(&self) -> String {
        match self {
            AppError::Store(inner) => format!("{self}: {inner}"),
            other => format!("{other:?}"),
        }
    }
}

/// ErrorBody
///
/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Attached to error responses so `expose_error_detail` can enrich the body
/// without re-parsing it.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub body: ErrorBody,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self.detail(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorBody {
            status: self.status().to_string(),
            message: self.public_message(),
            error: None,
        };
        let report = ErrorReport {
            body: body.clone(),
            detail: self.detail(),
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// expose_error_detail
///
/// Outermost application middleware. Outside production it rewrites error
/// bodies to carry the internal detail under `"error"`; in production it is
/// a pass-through.
pub async fn expose_error_detail(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if config.env == Env::Production {
        return response;
    }

    match response.extensions().get::<ErrorReport>().cloned() {
        Some(report) => {
            let mut body = report.body;
            body.error = Some(report.detail);
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}
