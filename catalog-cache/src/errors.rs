use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("Tool {0} not found")]
    ToolNotFound(String),
    #[error("Category {0} not found")]
    CategoryNotFound(i64),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    detail: String,
}

impl CatalogError {
    /// Returns (error_code, status_code) for this error.
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            CatalogError::ToolNotFound(_) => ("tool_not_found", StatusCode::NOT_FOUND),
            CatalogError::CategoryNotFound(_) => ("category_not_found", StatusCode::NOT_FOUND),
            CatalogError::BadRequest(_) => ("bad_request", StatusCode::BAD_REQUEST),
            CatalogError::DatabaseUnavailable => {
                ("database_unavailable", StatusCode::SERVICE_UNAVAILABLE)
            }
            CatalogError::DatabaseError(sqlx::Error::PoolTimedOut) => {
                ("database_unavailable", StatusCode::SERVICE_UNAVAILABLE)
            }
            CatalogError::DatabaseError(_) => ("database_error", StatusCode::INTERNAL_SERVER_ERROR),
            CatalogError::Internal(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    pub fn status_code(&self) -> StatusCode {
        self.error_metadata().1
    }
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let (code, status) = self.error_metadata();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }

        // Don't leak database internals to clients
        let detail = match &self {
            CatalogError::DatabaseError(_) | CatalogError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { code, detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CatalogError::ToolNotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CatalogError::BadRequest("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CatalogError::DatabaseUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CatalogError::DatabaseError(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CatalogError::DatabaseError(sqlx::Error::RowNotFound).error_code(),
            "database_error"
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let response = CatalogError::Internal("secret".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
