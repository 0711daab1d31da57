//! Error types for the Beacon

use thiserror::Error;

/// Main error type for the Beacon
#[derive(Error, Debug)]
pub enum BeaconError {
    // Transport errors
    #[error("Network connection error: {0}")]
    NetworkConnection(String),

    #[error("Not connected and outbound queue is full")]
    NotConnected,

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Session link down after {0} reconnect attempts")]
    LinkDown(u32),

    // Protocol errors
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown correlation id: {0}")]
    UnknownCorrelation(String),

    #[error("Duplicate correlation id: {0}")]
    DuplicateCorrelation(String),

    // Negotiation errors
    #[error("Negotiation not found: {0}")]
    NegotiationNotFound(String),

    #[error("Invalid negotiation state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid terms: {0}")]
    InvalidTerms(String),

    #[error("Negotiation expired: {0}")]
    NegotiationExpired(String),

    #[error("No price available: {0}")]
    Unpriceable(String),

    // Transaction errors
    #[error("Commit retries exhausted for {correlation_id}: {reason}")]
    CommitRetriesExhausted {
        correlation_id: String,
        reason: String,
    },

    #[error("Commit rejected for {correlation_id}: {reason}")]
    CommitRejected {
        correlation_id: String,
        reason: String,
    },

    #[error("Transaction not accepted: {0}")]
    NotAccepted(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Beacon operations
pub type Result<T> = std::result::Result<T, BeaconError>;

/// Outcome of an external order commit attempt, as reported by the
/// order gateway collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitFailure {
    /// Worth retrying (gateway timeout, congestion)
    #[error("Transient commit failure: {0}")]
    Transient(String),

    /// Never retried (terms rejected, inventory gone)
    #[error("Permanent commit failure: {0}")]
    Permanent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BeaconError::NegotiationNotFound("corr_123".to_string());
        assert_eq!(err.to_string(), "Negotiation not found: corr_123");
    }

    #[test]
    fn test_result_type() {
        fn sample_function() -> Result<u64> {
            Ok(42)
        }

        let result = sample_function();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_error_conversion() {
        fn io_error_function() -> Result<()> {
            std::fs::read_to_string("/nonexistent/file")?;
            Ok(())
        }

        let result = io_error_function();
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), BeaconError::Io(_)));
    }

    #[test]
    fn test_commit_retries_exhausted_error() {
        let err = BeaconError::CommitRetriesExhausted {
            correlation_id: "corr_1".to_string(),
            reason: "gateway timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Commit retries exhausted for corr_1: gateway timeout"
        );
    }

    #[test]
    fn test_commit_failure_classes() {
        let transient = CommitFailure::Transient("timeout".to_string());
        let permanent = CommitFailure::Permanent("inventory gone".to_string());

        assert_ne!(transient, permanent);
        assert_eq!(
            permanent.to_string(),
            "Permanent commit failure: inventory gone"
        );
    }
}
