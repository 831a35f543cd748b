use crate::registry::RegistryError;
use crate::store::StoreError;
use crate::validation::ValidationError;
use crate::zone::ZoneError;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a zone operation as seen by API clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Conflict(String),

    /// A lock could not be taken in time; nothing was written
    #[error("{0}")]
    Busy(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::AlreadyExists(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Internal(_) => 500,
            ServiceError::Busy(_) => 503,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "Bad Request",
            ServiceError::AlreadyExists(_) => "Forbidden",
            ServiceError::NotFound(_) => "Not Found",
            ServiceError::Conflict(_) => "Conflict",
            ServiceError::Internal(_) => "Internal Server Error",
            ServiceError::Busy(_) => "Service Unavailable",
        }
    }

    /// Short machine-readable name used in problem type URIs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad-request",
            ServiceError::AlreadyExists(_) => "already-exists",
            ServiceError::NotFound(_) => "not-found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Internal(_) => "internal",
            ServiceError::Busy(_) => "busy",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Busy(_))
    }
}

impl From<ZoneError> for ServiceError {
    fn from(err: ZoneError) -> Self {
        let message = err.to_string();
        match err {
            ZoneError::ZoneNotFound(_) => ServiceError::NotFound(message),
            ZoneError::ZoneExists(_) => ServiceError::AlreadyExists(message),
            ZoneError::DuplicateHost { .. } => ServiceError::Conflict(message),
            ZoneError::Busy(_) => ServiceError::Busy(message),
            ZoneError::Store(StoreError::InvalidKey(_)) => ServiceError::BadRequest(message),
            ZoneError::Corrupt { .. }
            | ZoneError::FileTooLarge(_)
            | ZoneError::SerialExhausted(_)
            | ZoneError::Store(_) => ServiceError::Internal(message),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Busy => ServiceError::Busy(err.to_string()),
            RegistryError::Malformed(_) | RegistryError::Store(_) => {
                ServiceError::Internal(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

/// Configuration problems found at startup
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid base path: {0}")]
    InvalidBasePath(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Failed to read configuration file: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(Arc::new(err))
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_errors_map_to_taxonomy() {
        let cases = [
            (ZoneError::ZoneNotFound("a.com".into()), 404),
            (ZoneError::ZoneExists("a.com".into()), 403),
            (
                ZoneError::DuplicateHost {
                    zone: "a.com".into(),
                    host: "www.a.com".into(),
                },
                409,
            ),
            (ZoneError::Busy("a.com".into()), 503),
            (ZoneError::SerialExhausted("a.com".into()), 500),
            (
                ZoneError::Corrupt {
                    zone: "a.com".into(),
                    line: 2,
                    reason: "bad".into(),
                },
                500,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ServiceError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_registry_errors_map_to_taxonomy() {
        assert_eq!(ServiceError::from(RegistryError::Busy).status_code(), 503);
        assert_eq!(
            ServiceError::from(RegistryError::Malformed("x".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(ServiceError::Busy("x".into()).is_retryable());
        assert!(!ServiceError::Internal("x".into()).is_retryable());
        assert_eq!(ServiceError::AlreadyExists("x".into()).title(), "Forbidden");
    }
}
