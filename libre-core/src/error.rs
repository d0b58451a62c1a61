//! Error types for LibreUltra operations
//!
//! The broker never surfaces these to its callers (a failed lookup is just an
//! absent value). They exist for the seams underneath it: the HTTP transport,
//! config loading, the persisted state store and the version source.

use thiserror::Error;

/// Outbound HTTP errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("HTTP client could not be built: {reason}")]
    ClientBuild { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or LIBRE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Persisted state errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("State file {path} could not be accessed: {reason}")]
    Io { path: String, reason: String },

    #[error("State could not be (de)serialized: {reason}")]
    Serialization { reason: String },

    #[error("State lock poisoned")]
    LockPoisoned,
}

/// Master error type for all LibreUltra errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LibreError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Result type alias for LibreUltra operations.
pub type LibreResult<T> = Result<T, LibreError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display_includes_url() {
        let err = TransportError::RequestFailed {
            url: "https://sponsor.ajay.app/api/skipSegments?videoID=x".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("skipSegments"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_config_error_missing_path_mentions_env_var() {
        let msg = ConfigError::MissingConfigPath.to_string();
        assert!(msg.contains("LIBRE_CONFIG"));
    }

    #[test]
    fn test_libre_error_from_variants() {
        let err: LibreError = StateError::LockPoisoned.into();
        assert!(matches!(err, LibreError::State(StateError::LockPoisoned)));

        let err: LibreError = ConfigError::Parse {
            reason: "expected `=`".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Config error"));

        let err: LibreError = TransportError::ClientBuild {
            reason: "tls backend".to_string(),
        }
        .into();
        assert!(matches!(err, LibreError::Transport(_)));
    }
}
