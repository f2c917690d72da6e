//! Error types for PROMPTDECK operations
//!
//! Environmental failures (disk, refresh callbacks) are logged and swallowed
//! on the cache read/write path; only programmer-error-class failures
//! (`ConfigError`) surface synchronously to callers.

use thiserror::Error;

/// Configuration errors.
///
/// These indicate programmer error and are raised synchronously at cache
/// construction or reconfiguration time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Persistence layer errors.
///
/// Callers of `get`/`set` never see these: the cache logs them and keeps
/// serving from memory. They surface only from the explicit `dump` operation.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Cache key mismatch in persisted file: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },
}

/// Refresh callback errors.
///
/// Returned by caller-supplied refresh callbacks; the cache counts and logs
/// them, then keeps serving the stale value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh fetch failed for {key}: {reason}")]
    Fetch { key: String, reason: String },

    #[error("Refresh cancelled for {key}")]
    Cancelled { key: String },
}

impl RefreshError {
    /// Convenience constructor for the common fetch-failure case.
    pub fn fetch(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Master error type for all PROMPTDECK errors.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),
}

/// Result type alias for PROMPTDECK operations.
pub type DeckResult<T> = Result<T, DeckError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "refresh_interval".to_string(),
            value: "0s".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("refresh_interval"));
        assert!(msg.contains("0s"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_persist_error_display_key_mismatch() {
        let err = PersistError::KeyMismatch {
            expected: "acme/summarizer:abc".to_string(),
            found: "acme/other:def".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("acme/summarizer:abc"));
        assert!(msg.contains("acme/other:def"));
    }

    #[test]
    fn test_refresh_error_fetch_constructor() {
        let err = RefreshError::fetch("acme/summarizer:abc", "connection reset");
        let msg = format!("{}", err);
        assert!(msg.contains("acme/summarizer:abc"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_deck_error_from_config() {
        let err: DeckError = ConfigError::InvalidValue {
            field: "ttl".to_string(),
            value: "nan".to_string(),
            reason: "not a duration".to_string(),
        }
        .into();
        assert!(format!("{}", err).starts_with("Config error"));
    }
}
