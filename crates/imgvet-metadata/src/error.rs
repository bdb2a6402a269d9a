//! Error types for collaborator calls

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by metadata, repository and signing collaborators.
///
/// Every variant means "the collaborator could not be consulted". None of
/// them describe a policy outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorError {
    /// Transport or authentication failure
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    /// The collaborator has no record for the requested key
    #[error("{kind} not found: {key}")]
    NotFound { kind: String, key: String },

    /// The signing primitive refused or failed
    #[error("signing failed: {0}")]
    Signing(String),

    /// Payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl CollaboratorError {
    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        CollaboratorError::Unavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        CollaboratorError::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Serialization(err.to_string())
    }
}
