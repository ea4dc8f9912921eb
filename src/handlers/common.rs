use crate::errors::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{ApiResponse, PaginatedResponse};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Pagination parameters for list operations. Missing values fall back to
/// the configured defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Resolves to `(page, limit)`, capping `limit` at `max_limit`.
    pub fn resolve(&self, default_limit: u64, max_limit: u64) -> (u64, u64) {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(default_limit).min(max_limit);
        (page, limit)
    }
}

pub fn paginated_response<T: Serialize>(items: Vec<T>, total: u64, page: u64, limit: u64) -> Response {
    success_response(PaginatedResponse::new(items, total, page, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_caps() {
        let params = PaginationParams::default();
        assert_eq!(params.resolve(20, 100), (1, 20));

        let params = PaginationParams {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(params.resolve(20, 100), (3, 100));
    }

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1))]
        name: String,
    }

    #[test]
    fn validate_input_maps_to_validation_error() {
        let err = validate_input(&Named {
            name: String::new(),
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        assert!(validate_input(&Named { name: "x".into() }).is_ok());
    }
}
