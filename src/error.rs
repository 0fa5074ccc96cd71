use crate::datasource::DirectoryError;
use crate::domain::{InvalidStatus, PayoutMonthParseError};
use crate::engine::{IncompleteDealError, PlanError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Store or directory unavailable. Fails the whole operation.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("partner directory error: {0}")]
    Directory(#[from] DirectoryError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input, rejected before any write.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error(transparent)]
    IncompleteDeal(#[from] IncompleteDealError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The record exists but is in a state that forbids the operation.
    #[error("{0}")]
    Conflict(String),
    /// Payouts were committed but the event could not be marked confirmed.
    /// Re-running the confirmation is safe: payout inserts are idempotent.
    #[error("event {event_id}: {payouts_inserted} payouts committed but status update failed: {source}")]
    StatusUpdateAfterPayouts {
        event_id: String,
        payouts_inserted: usize,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Dependency(DependencyError::Store(err))
    }
}

impl From<DirectoryError> for EngineError {
    fn from(err: DirectoryError) -> Self {
        EngineError::Dependency(DependencyError::Directory(err))
    }
}

impl From<PlanError> for EngineError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Incomplete(e) => EngineError::IncompleteDeal(e),
            PlanError::Overflow { field, .. } => EngineError::validation(field, err.to_string()),
        }
    }
}

impl From<InvalidStatus> for EngineError {
    fn from(err: InvalidStatus) -> Self {
        EngineError::validation(err.field, err.to_string())
    }
}

impl From<PayoutMonthParseError> for EngineError {
    fn from(err: PayoutMonthParseError) -> Self {
        EngineError::validation("payout_month", err.to_string())
    }
}

/// One failed row or chunk inside a bulk operation that otherwise committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::Validation { .. } => AppError::BadRequest(message),
            EngineError::IncompleteDeal(_) => AppError::Unprocessable(message),
            EngineError::NotFound { .. } => AppError::NotFound(message),
            EngineError::Conflict(_) => AppError::Conflict(message),
            EngineError::StatusUpdateAfterPayouts { .. } => AppError::Internal(message),
            EngineError::Dependency(_) => AppError::Unavailable(message),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_deal_maps_to_422() {
        let err: AppError = EngineError::from(IncompleteDealError::NoParticipants {
            event_id: "e1".to_string(),
        })
        .into();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn invalid_status_becomes_validation() {
        let err: EngineError = crate::domain::validate_paid_status("nope").unwrap_err().into();
        match err {
            EngineError::Validation { field, .. } => assert_eq!(field, "paid_status"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn store_errors_are_dependency_errors() {
        let err: EngineError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, EngineError::Dependency(DependencyError::Store(_))));
        let app: AppError = err.into();
        assert_eq!(app.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
