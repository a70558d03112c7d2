//! Error types for the relay pipeline.

use std::time::Duration;

use thiserror::Error;
use zkv_common::ArtifactError;

use crate::session::SessionError;

/// Aggregated error type for a pipeline run.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// Missing or malformed configuration. Raised before any network I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading or writing an artifact failed.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A session could not be opened outside the submission loop.
    #[error("session error: {0}")]
    Session(#[source] SessionError),

    /// Submission failed on the given attempt (1-based).
    #[error("submission attempt {attempt} failed: {source}")]
    Submission {
        attempt: u32,
        #[source]
        source: SessionError,
    },

    /// The network answered with missing or malformed fields.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An input artifact is well-formed JSON but unusable.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The statement was submitted but its aggregation did not complete in
    /// time. The identifiers are enough to resume by hand.
    #[error(
        "aggregation {aggregation_id} in domain {domain_id} not published within {}s (statement {statement})",
        .timeout.as_secs()
    )]
    AggregationTimeout {
        statement: String,
        domain_id: u32,
        aggregation_id: u64,
        timeout: Duration,
    },

    /// Waiting for the aggregation failed after a successful submission.
    #[error(
        "waiting for aggregation {aggregation_id} in domain {domain_id} failed (statement {statement}): {source}"
    )]
    Aggregation {
        statement: String,
        domain_id: u32,
        aggregation_id: u64,
        #[source]
        source: SessionError,
    },

    /// Fetching the Merkle path failed after the aggregation was published.
    #[error(
        "statement path for {statement} in aggregation {aggregation_id} (domain {domain_id}, block {block_hash}) unavailable: {source}"
    )]
    StatementPath {
        statement: String,
        domain_id: u32,
        aggregation_id: u64,
        block_hash: String,
        #[source]
        source: SessionError,
    },

    /// The network returned a Merkle path that cannot belong to the
    /// aggregation it was fetched for.
    #[error(
        "invalid statement path for {statement} in aggregation {aggregation_id} (domain {domain_id}, block {block_hash}): {reason}"
    )]
    InvalidPath {
        statement: String,
        domain_id: u32,
        aggregation_id: u64,
        block_hash: String,
        reason: String,
    },

    /// The network could not compute the verification key hash.
    #[error("vkey hash computation failed: {0}")]
    VkHash(#[source] SessionError),
}

impl RelayerError {
    /// Get a machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayerError::Config(_) => "CONFIG_ERROR",
            RelayerError::Artifact(_) => "ARTIFACT_ERROR",
            RelayerError::Session(_) => "SESSION_ERROR",
            RelayerError::Submission { .. } => "SUBMISSION_FAILED",
            RelayerError::Protocol(_) => "PROTOCOL_ERROR",
            RelayerError::InvalidArtifact(_) => "INVALID_ARTIFACT",
            RelayerError::AggregationTimeout { .. } => "AGGREGATION_TIMEOUT",
            RelayerError::Aggregation { .. } => "AGGREGATION_FAILED",
            RelayerError::StatementPath { .. } => "STATEMENT_PATH_FAILED",
            RelayerError::InvalidPath { .. } => "INVALID_STATEMENT_PATH",
            RelayerError::VkHash(_) => "VKEY_HASH_FAILED",
        }
    }

    /// Check if resubmitting could succeed. Only submission failures with a
    /// transient cause qualify; nothing after inclusion is ever resubmitted.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayerError::Submission { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RelayerError::Config("missing seed".into()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            RelayerError::AggregationTimeout {
                statement: "0xabc".into(),
                domain_id: 0,
                aggregation_id: 7,
                timeout: Duration::from_secs(900),
            }
            .error_code(),
            "AGGREGATION_TIMEOUT"
        );
    }

    #[test]
    fn test_retryable_errors() {
        let transient = RelayerError::Submission {
            attempt: 1,
            source: SessionError::Transport("Abnormal Closure".into()),
        };
        assert!(transient.is_retryable());

        let rejected = RelayerError::Submission {
            attempt: 1,
            source: SessionError::Rejected("bad proof".into()),
        };
        assert!(!rejected.is_retryable());

        let after_inclusion = RelayerError::Aggregation {
            statement: "0xabc".into(),
            domain_id: 0,
            aggregation_id: 7,
            source: SessionError::Transport("disconnected".into()),
        };
        assert!(!after_inclusion.is_retryable());
    }

    #[test]
    fn test_timeout_message_carries_identifiers() {
        let err = RelayerError::AggregationTimeout {
            statement: "0xabc".into(),
            domain_id: 2,
            aggregation_id: 41,
            timeout: Duration::from_millis(900_000),
        };
        let message = err.to_string();
        assert!(message.contains("0xabc"));
        assert!(message.contains("41"));
        assert!(message.contains("domain 2"));
        assert!(message.contains("900s"));
    }

    #[test]
    fn test_invalid_path_is_final_and_identified() {
        let err = RelayerError::InvalidPath {
            statement: "0xabc".into(),
            domain_id: 2,
            aggregation_id: 41,
            block_hash: "0xblock".into(),
            reason: "leaf index 8 out of range for 8 leaves".into(),
        };
        assert_eq!(err.error_code(), "INVALID_STATEMENT_PATH");
        assert!(!err.is_retryable());
        let message = err.to_string();
        assert!(message.contains("0xabc"));
        assert!(message.contains("aggregation 41"));
        assert!(message.contains("domain 2"));
        assert!(message.contains("block 0xblock"));
        assert!(message.contains("leaf index 8"));
    }
}
