//! Error types for the Envia provisioning service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nms_core::{NmsError, XmlError};
use serde_json::json;

use crate::response::ErrorMessage;

/// Result type alias
pub type Result<T> = std::result::Result<T, EnviaError>;

#[derive(Debug, thiserror::Error)]
pub enum EnviaError {
    /// Local data is missing something the request needs
    #[error("Cannot create XML: {0}")]
    XmlCreation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Envia API answered with HTTP {status}: {}", format_messages(.messages))]
    Provider {
        status: u16,
        messages: Vec<ErrorMessage>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_messages(messages: &[ErrorMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{} ({})", m.message, m.status))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for EnviaError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            EnviaError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            EnviaError::InvalidArgument(_) | EnviaError::UnexpectedValue(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            EnviaError::XmlCreation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            EnviaError::Provider { .. } | EnviaError::Http(_) => {
                tracing::warn!("Envia request failed: {}", self);
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            EnviaError::Xml(_)
            | EnviaError::Csv(_)
            | EnviaError::Base64(_)
            | EnviaError::Io(_)
            | EnviaError::Config(_) => {
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

impl From<EnviaError> for NmsError {
    fn from(err: EnviaError) -> Self {
        match err {
            EnviaError::XmlCreation(m)
            | EnviaError::InvalidArgument(m)
            | EnviaError::UnexpectedValue(m) => NmsError::Validation(m),
            EnviaError::NotFound(m) => NmsError::NotFound(m),
            EnviaError::Provider { .. } | EnviaError::Http(_) => NmsError::Network(err.to_string()),
            EnviaError::Io(e) => NmsError::Storage(e.to_string()),
            EnviaError::Config(m) => NmsError::Config(m),
            EnviaError::Xml(_) | EnviaError::Csv(_) | EnviaError::Base64(_) => {
                NmsError::Internal(err.to_string())
            }
        }
    }
}
