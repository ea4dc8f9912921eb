use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::{DbErr, RuntimeErr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error body returned by every HTTP endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Machine-readable error kind, e.g. `negative_stock`
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Negative stock: applying {delta} to quantity {quantity} for sku {sku_id} at location {location_id} would go below zero"
    )]
    NegativeStock {
        sku_id: Uuid,
        location_id: Uuid,
        quantity: i32,
        delta: i32,
    },

    #[error(
        "Insufficient available stock for sku {sku_id} at location {location_id}: available {available}, requested {requested}"
    )]
    InsufficientAvailable {
        sku_id: Uuid,
        location_id: Uuid,
        available: i32,
        requested: i32,
    },

    #[error(
        "Over-consumption for sku {sku_id} at location {location_id}: reserved {reserved}, requested {requested}"
    )]
    OverConsumption {
        sku_id: Uuid,
        location_id: Uuid,
        reserved: i32,
        requested: i32,
    },

    #[error("Audit {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

/// SQLSTATE / SQLite result codes that mean "the transaction lost a race,
/// try again": serialization failure, deadlock, busy, locked.
const TRANSIENT_DB_CODES: &[&str] = &["40001", "40P01", "5", "6", "261", "262", "517", "773"];

fn is_transient_db_err(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::ConnectionAcquire(_) => return true,
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => e,
        _ => return false,
    };

    match runtime {
        RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db_err)) => db_err
            .code()
            .map(|code| TRANSIENT_DB_CODES.contains(&code.as_ref()))
            .unwrap_or(false),
        RuntimeErr::SqlxError(sea_orm::sqlx::Error::PoolTimedOut) => true,
        _ => false,
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    /// Serialization failures and lock contention surface as
    /// [`ServiceError::TransactionAborted`] so callers can retry.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        let err = error.into_db_err();
        if is_transient_db_err(&err) {
            ServiceError::TransactionAborted(err.to_string())
        } else {
            ServiceError::DatabaseError(err)
        }
    }

    /// Transient failures leave no partial state behind; retrying is safe.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransactionAborted(_))
    }

    /// Signals that are not faults: the requested state already holds.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::AlreadyCompleted(_))
    }

    /// Machine-readable kind, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::NegativeStock { .. } => "negative_stock",
            Self::InsufficientAvailable { .. } => "insufficient_available",
            Self::OverConsumption { .. } => "over_consumption",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::TransactionAborted(_) => "transaction_aborted",
            Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NegativeStock { .. }
            | Self::InsufficientAvailable { .. }
            | Self::OverConsumption { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyCompleted(_) => StatusCode::CONFLICT,
            Self::TransactionAborted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::TransactionAborted(_) => {
                "Transaction aborted by a concurrent update; retry the request".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn pair() -> (Uuid, Uuid) {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn stock_rejections_map_to_unprocessable_entity() {
        let (sku_id, location_id) = pair();
        let errors = [
            ServiceError::NegativeStock {
                sku_id,
                location_id,
                quantity: 3,
                delta: -5,
            },
            ServiceError::InsufficientAvailable {
                sku_id,
                location_id,
                available: 4,
                requested: 6,
            },
            ServiceError::OverConsumption {
                sku_id,
                location_id,
                reserved: 1,
                requested: 2,
            },
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
            assert!(!err.is_transient());
            assert!(!err.is_soft());
        }
    }

    #[test]
    fn already_completed_is_soft_conflict() {
        let err = ServiceError::AlreadyCompleted(Uuid::new_v4());
        assert!(err.is_soft());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "already_completed");
    }

    #[test]
    fn custom_db_errors_are_not_transient() {
        let err = ServiceError::db_error("constraint failed");
        assert!(matches!(err, ServiceError::DatabaseError(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::db_error("secret table name").response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("boom".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::NotFound("Audit x not found".into()).response_message(),
            "Not found: Audit x not found"
        );
    }

    #[tokio::test]
    async fn error_response_carries_machine_readable_code() {
        let (sku_id, location_id) = pair();
        let response = ServiceError::OverConsumption {
            sku_id,
            location_id,
            reserved: 0,
            requested: 5,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "over_consumption");
        assert_eq!(payload.error, "Unprocessable Entity");
    }
}
