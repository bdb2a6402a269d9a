//! Error taxonomy for vetting runs.
//!
//! A policy violation is never an error: checks report it as `Ok(false)`.
//! Everything here means "could not determine" or "could not record".

use imgvet_metadata::{CollaboratorError, ImageRefError};
use serde::{Deserialize, Serialize};

use crate::report::ErrorCause;

/// Errors a single check can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckError {
    #[error("collaborator unavailable: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("check cancelled before completion")]
    Cancelled,

    #[error("check task aborted: {0}")]
    Aborted(String),
}

/// Configuration and setup errors raised before a run starts.
#[derive(Debug, thiserror::Error)]
pub enum VetError {
    #[error("no checks configured")]
    NoChecks,

    #[error("unknown check: {0}")]
    UnknownCheck(String),

    #[error("check {0} configured more than once")]
    DuplicateCheck(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid image reference: {0}")]
    InvalidImage(#[from] ImageRefError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from writing an attestation after a passed verdict.
///
/// These never change the verdict; the run stays `Passed` and publication
/// can be retried without re-evaluating checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishError {
    #[error("cannot attest a run that did not pass")]
    NotPassed,

    #[error("occurrence lookup failed: {0}")]
    Lookup(CollaboratorError),

    #[error("payload signing failed: {0}")]
    Signing(CollaboratorError),

    #[error("signer returned an empty signature")]
    EmptySignature,

    #[error("occurrence write failed: {0}")]
    Write(CollaboratorError),

    #[error("payload encoding failed: {0}")]
    Encoding(String),

    /// The run's deadline or cancellation fired while publishing.
    #[error("publication interrupted: {0}")]
    Interrupted(ErrorCause),
}

/// Result type for check evaluation.
pub type CheckResult<T> = std::result::Result<T, CheckError>;

/// Result type for engine setup.
pub type VetResult<T> = std::result::Result<T, VetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_error_wraps_collaborator_error() {
        let err: CheckError = CollaboratorError::unavailable("github", "timeout").into();
        assert_eq!(
            err.to_string(),
            "collaborator unavailable: github unavailable: timeout"
        );
    }

    #[test]
    fn test_publish_error_display() {
        let err = PublishError::Write(CollaboratorError::unavailable("metadata", "503"));
        assert!(err.to_string().contains("occurrence write failed"));
        assert!(err.to_string().contains("503"));

        let err = PublishError::Interrupted(ErrorCause::DeadlineExceeded);
        assert_eq!(err.to_string(), "publication interrupted: deadline exceeded");
    }

    #[test]
    fn test_vet_error_display() {
        assert!(VetError::UnknownCheck("nobody".to_string())
            .to_string()
            .contains("nobody"));
    }
}
