//! Error types and result aliases for the turntrace library.
//!
//! Correlation itself never fails; these errors come from the edges of a turn:
//! the event source, replay files, and configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurntraceError {
    #[error("Turn execution failed: {0}")]
    TurnExecutionFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Replay error: {0}")]
    ReplayError(String),
}

pub type Result<T> = std::result::Result<T, TurntraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_execution_failed_display() {
        let err = TurntraceError::TurnExecutionFailed("transport closed".to_string());
        assert_eq!(err.to_string(), "Turn execution failed: transport closed");
    }

    #[test]
    fn test_config_error_display() {
        let err = TurntraceError::ConfigError("bad value".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: bad value");
    }

    #[test]
    fn test_replay_error_display() {
        let err = TurntraceError::ReplayError("line 3: missing kind".to_string());
        assert_eq!(err.to_string(), "Replay error: line 3: missing kind");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TurntraceError = json_err.into();

        match err {
            TurntraceError::SerializationError(_) => {}
            _ => panic!("Expected SerializationError"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TurntraceError = io_err.into();

        match err {
            TurntraceError::IoError(_) => {}
            _ => panic!("Expected IoError"),
        }
    }
}
