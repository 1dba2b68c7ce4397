use axum::http::StatusCode;

use crate::error::DataError;

pub mod handlers;

/// Map a loader error to the HTTP status a handler should answer with.
pub(crate) fn status_for(error: &DataError) -> StatusCode {
    match error {
        DataError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DataError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        DataError::DuplicateKey(_) | DataError::MissingConflictTarget(_) => StatusCode::CONFLICT,
        DataError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
