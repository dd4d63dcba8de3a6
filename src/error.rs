use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Every failure the reservation core can surface to a caller.
///
/// Each variant maps to a stable [`ReservationError::kind`] string so clients
/// can branch on it without parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("{0}")]
    Validation(String),

    #[error("seats {} are no longer available", join_ids(.0))]
    SeatUnavailable(Vec<i64>),

    #[error("seats {} are locked by another session", join_ids(.0))]
    LockedByOther(Vec<i64>),

    #[error("seats {} are not locked", join_ids(.0))]
    NotLocked(Vec<i64>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} has expired")]
    Expired(String),

    /// Deliberately carries no detail.
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidState(String),

    #[error("concurrent update conflict, retry the request")]
    ConflictAborted,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ReservationResult<T> = Result<T, ReservationError>;

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReservationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReservationError::Validation(_) => "VALIDATION_ERROR",
            ReservationError::SeatUnavailable(_) => "SEAT_UNAVAILABLE",
            ReservationError::LockedByOther(_) => "LOCKED_BY_OTHER",
            ReservationError::NotLocked(_) => "NOT_LOCKED",
            ReservationError::NotFound(_) => "NOT_FOUND",
            ReservationError::Expired(_) => "EXPIRED",
            ReservationError::Unauthorized => "UNAUTHORIZED",
            ReservationError::InvalidState(_) => "INVALID_STATE",
            ReservationError::ConflictAborted => "CONFLICT_ABORTED",
            ReservationError::Database(_)
            | ReservationError::Cache(_)
            | ReservationError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReservationError::Validation(_) => StatusCode::BAD_REQUEST,
            ReservationError::Unauthorized => StatusCode::UNAUTHORIZED,
            ReservationError::NotFound(_) => StatusCode::NOT_FOUND,
            ReservationError::Expired(_) => StatusCode::GONE,
            ReservationError::SeatUnavailable(_)
            | ReservationError::LockedByOther(_)
            | ReservationError::NotLocked(_)
            | ReservationError::InvalidState(_)
            | ReservationError::ConflictAborted => StatusCode::CONFLICT,
            ReservationError::Database(_)
            | ReservationError::Cache(_)
            | ReservationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationError::ConflictAborted)
    }
}

impl From<sqlx::Error> for ReservationError {
    fn from(err: sqlx::Error) -> Self {
        // 40001 serialization_failure, 40P01 deadlock_detected, 23505 unique_violation
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "23505")) {
                return ReservationError::ConflictAborted;
            }
        }
        ReservationError::Database(err)
    }
}

impl From<ValidationErrors> for ReservationError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Vec::new();
        collect_validation_messages(&errors, "", &mut fields);
        fields.sort();
        ReservationError::Validation(fields.join("; "))
    }
}

fn collect_validation_messages(errors: &ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                let detail = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                out.push(format!("{} {}", path, detail));
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_messages(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_messages(inner, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

#[derive(Serialize)]
pub struct ApiError {
    success: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for ReservationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ApiError {
            success: false,
            error: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_errors_list_the_offending_ids() {
        let err = ReservationError::SeatUnavailable(vec![3, 7]);
        assert_eq!(err.to_string(), "seats 3, 7 are no longer available");
        assert_eq!(err.kind(), "SEAT_UNAVAILABLE");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn unauthorized_leaks_nothing() {
        assert_eq!(ReservationError::Unauthorized.to_string(), "unauthorized");
        assert_eq!(
            ReservationError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(ReservationError::ConflictAborted.is_retryable());
        assert!(!ReservationError::SeatUnavailable(vec![1]).is_retryable());
        assert!(!ReservationError::Expired("order".into()).is_retryable());
    }

    #[test]
    fn internal_errors_map_to_500() {
        let err = ReservationError::Internal("boom".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "INTERNAL_ERROR");
    }
}
