//! The pluggable policy contract.
//!
//! A [`Check`] is bound to its collaborators at construction time and is
//! stateless afterwards, so one instance can be shared by any number of
//! concurrent vetting runs.
//!
//! `evaluate` returns:
//! - `Ok(true)`: the policy holds for the image
//! - `Ok(false)`: the policy is violated (a clean verdict, not an error)
//! - `Err(_)`: a collaborator could not be consulted; nothing is inferred

use std::sync::Arc;

use async_trait::async_trait;
use imgvet_metadata::{BuildDetail, ImageRef, MetadataClient, RepositoryClient};
use uuid::Uuid;

use crate::error::CheckResult;

/// Unique identifier for a vetting run
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a check may read about the image under evaluation.
///
/// The build detail is resolved once per run by the engine and shared by
/// every check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub run_id: RunId,
    pub image: ImageRef,
    pub build: BuildDetail,
}

impl CheckContext {
    pub fn new(run_id: RunId, image: ImageRef, build: BuildDetail) -> Self {
        Self {
            run_id,
            image,
            build,
        }
    }
}

/// A single pass/fail policy.
#[async_trait]
pub trait Check: Send + Sync {
    /// Stable name used in reports, configuration and policy-set ids.
    fn name(&self) -> &str;

    /// Evaluate the policy. Must not publish anything or mutate
    /// collaborator state.
    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult<bool>;
}

/// The shared, read-only services injected into every check.
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataClient>,
    pub repository: Arc<dyn RepositoryClient>,
}

impl Collaborators {
    pub fn new(metadata: Arc<dyn MetadataClient>, repository: Arc<dyn RepositoryClient>) -> Self {
        Self {
            metadata,
            repository,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
