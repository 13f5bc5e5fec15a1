//! Error definitions for Rover

use thiserror::Error;

/// Rover error types
#[derive(Error, Debug)]
pub enum RovError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or short frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Value outside the representable or safe range
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection-level I/O failure on an active connection
    #[error("Transport error: {0}")]
    Transport(std::io::Error),

    /// Actuator or sensor I/O failure
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Telemetry payload exceeds frame capacity
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Timeout")]
    Timeout,
}

impl RovError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        RovError::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        RovError::Validation(msg.into())
    }

    pub fn hardware(msg: impl Into<String>) -> Self {
        RovError::Hardware(msg.into())
    }

    /// True for errors that mean "the peer went away or the link broke"
    pub fn is_transport(&self) -> bool {
        matches!(self, RovError::Transport(_))
    }
}

/// Result type alias for Rover operations
pub type RovResult<T> = Result<T, RovError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RovError::Config("test".to_string());
        assert_eq!(format!("{}", err), "Configuration error: test");

        let err = RovError::protocol("short frame");
        assert_eq!(format!("{}", err), "Protocol error: short frame");
    }

    #[test]
    fn test_is_transport() {
        let err = RovError::Transport(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.is_transport());
        assert!(!RovError::Timeout.is_transport());
    }
}
