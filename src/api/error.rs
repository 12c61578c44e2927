use std::any::Any;

use axum::{
    BoxError, Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower::timeout::error::Elapsed;
use tracing::{error, warn};

use crate::{
    processor::{ErrorKind, LedgerError},
    store::StoreError,
};

/// Body of every failed response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Payload(#[from] JsonRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
    /// Failure outside the ledger, raised by the HTTP layer itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Ledger(err) => err.kind(),
            ApiError::Payload(_) | ApiError::Query(_) => ErrorKind::InvalidRequest,
            ApiError::Internal(_) => ErrorKind::StoreError,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Payload(JsonRejection::MissingJsonContentType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            _ => status_for(self.kind()),
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientFunds => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::StoreError | ErrorKind::LedgerInconsistency => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = self.status();
        if kind.is_caller_fixable() {
            warn!(error = %self, kind = kind.as_str(), "Request rejected");
        } else {
            error!(error = %self, kind = kind.as_str(), "Request failed");
        }
        let body = ErrorBody {
            error: kind.as_str().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Turns errors of the tower middleware (the request deadline) into the usual
/// error body.
pub async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        LedgerError::from(StoreError::Timeout("handling the request".to_string())).into()
    } else {
        ApiError::Internal(err.to_string())
    }
}

/// Response for a handler that panicked.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}
