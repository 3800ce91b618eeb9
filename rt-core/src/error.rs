//! Global error types for the realtime link.
//!
//! Every fallible helper in the workspace returns `RtResult`. The public
//! surface of the connection manager never hands these to callers; it logs
//! them and turns them into state transitions instead.

use thiserror::Error;

/// Convenience type alias for Results using RtError.
pub type RtResult<T> = Result<T, RtError>;

/// Unified error type for the realtime link.
#[derive(Error, Debug)]
pub enum RtError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Transport errors --
    /// The connection endpoint could not be built from the configured address.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// The underlying socket failed to open, write or close.
    #[error("transport error: {0}")]
    Transport(String),

    /// An operation needed an open connection.
    #[error("not connected")]
    NotConnected,

    /// Timed out waiting for the connection.
    #[error("timeout: {0}")]
    Timeout(String),

    // -- Codec errors --
    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for RtError {
    fn from(e: serde_json::Error) -> Self {
        RtError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RtError {
    fn from(e: toml::de::Error) -> Self {
        RtError::Config(e.to_string())
    }
}

impl From<url::ParseError> for RtError {
    fn from(e: url::ParseError) -> Self {
        RtError::InvalidUrl(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rt_error_display() {
        let err = RtError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");
        assert_eq!(RtError::NotConnected.to_string(), "not connected");
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let err: RtError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, RtError::Serialization(_)));
    }

    #[test]
    fn test_url_error_converts_to_invalid_url() {
        let err: RtError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, RtError::InvalidUrl(_)));
    }
}
