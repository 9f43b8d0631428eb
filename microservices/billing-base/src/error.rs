//! Error types for the billing base service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nms_core::{NmsError, XmlError};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    Database(#[from] nms_db::DbError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            BillingError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            BillingError::InvalidRequest(_) | BillingError::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            BillingError::Database(_)
            | BillingError::Io(_)
            | BillingError::Xml(_)
            | BillingError::Csv(_)
            | BillingError::Config(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for NmsError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Database(e) => NmsError::Database(e.to_string()),
            BillingError::InvalidRequest(m) => NmsError::Validation(m),
            BillingError::Validation(e) => NmsError::Validation(e.to_string()),
            BillingError::NotFound(m) => NmsError::NotFound(m),
            BillingError::Io(e) => NmsError::Storage(e.to_string()),
            BillingError::Xml(e) => NmsError::Internal(e.to_string()),
            BillingError::Csv(e) => NmsError::Storage(e.to_string()),
            BillingError::Config(m) => NmsError::Config(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = BillingError::NotFound("range 3".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = BillingError::InvalidRequest("bad kind".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = BillingError::Config("missing".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_database_error_is_internal() {
        let err: BillingError = nms_db::DbError::Pool("column \"start\" is int4".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_into_core_error() {
        let err: NmsError = BillingError::InvalidRequest("x".into()).into();
        assert_eq!(err.status_code(), 400);
    }
}
