//! Error types for NMS services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NmsError>;

#[derive(Error, Debug)]
pub enum NmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NmsError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Network(_) => 502,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for NmsError {
    fn from(err: std::io::Error) -> Self {
        NmsError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(NmsError::Validation("x".into()).status_code(), 400);
        assert_eq!(NmsError::NotFound("x".into()).status_code(), 404);
        assert_eq!(NmsError::Database("x".into()).status_code(), 500);
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err: NmsError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }
}
