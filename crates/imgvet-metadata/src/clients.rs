//! Collaborator trait definitions
//!
//! These traits define the services the vetting engine consumes:
//! - `MetadataClient`: build metadata and attestation occurrences
//! - `RepositoryClient`: source-control facts for a build
//! - `PayloadSigner`: the signing primitive for attestation payloads
//!
//! Implementations must be safe for unsynchronised concurrent use. Reads are
//! side-effect free; the only write is `MetadataClient::publish_occurrence`.
//! Cancellation is expressed by dropping the returned future.

use async_trait::async_trait;

use crate::error::CollaboratorError;
use crate::image::ImageRef;
use crate::model::{Branch, BuildDetail, Commit, Occurrence, PolicySetId};

/// Result type for collaborator calls
pub type ClientResult<T> = std::result::Result<T, CollaboratorError>;

// ---------------------------------------------------------------------------
// MetadataClient
// ---------------------------------------------------------------------------

/// Build metadata and attestation storage.
///
/// Guarantees:
/// - `get_build_detail` returns fresh data on every call.
/// - After a successful `publish_occurrence(image, set, ..)`,
///   `get_occurrence(image, set)` returns `Some`.
/// - Publishing for an (image, set) pair that already has an occurrence
///   leaves exactly one current record.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Resolve the build that produced `image`.
    async fn get_build_detail(&self, image: &ImageRef) -> ClientResult<BuildDetail>;

    /// Write an attestation occurrence for `image` under `policy_set`.
    async fn publish_occurrence(
        &self,
        image: &ImageRef,
        policy_set: &PolicySetId,
        signed_payload: Vec<u8>,
    ) -> ClientResult<()>;

    /// Read the current occurrence for (image, policy_set), if any.
    async fn get_occurrence(
        &self,
        image: &ImageRef,
        policy_set: &PolicySetId,
    ) -> ClientResult<Option<Occurrence>>;
}

// ---------------------------------------------------------------------------
// RepositoryClient
// ---------------------------------------------------------------------------

/// Source-control provider.
///
/// A returned `Commit` is a consistent snapshot for one evaluation.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Fetch the commit named by `build`.
    async fn get_commit(&self, build: &BuildDetail) -> ClientResult<Commit>;

    /// Fetch the default (production) branch of `build`'s repository.
    async fn get_default_branch(&self, build: &BuildDetail) -> ClientResult<Branch>;
}

// ---------------------------------------------------------------------------
// PayloadSigner
// ---------------------------------------------------------------------------

/// Opaque signing primitive.
#[async_trait]
pub trait PayloadSigner: Send + Sync {
    /// Identifier of the signing key, recorded next to each signature.
    fn key_id(&self) -> &str;

    /// Sign `payload`, returning the raw signature bytes.
    async fn sign(&self, payload: &[u8]) -> ClientResult<Vec<u8>>;
}
