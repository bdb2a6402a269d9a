//! imgvet-metadata: Image Identity and Collaborator Contracts
//!
//! This crate holds everything the vetting engine consumes but does not own:
//! the digest-pinned image identity, the build and source-control data model,
//! and the async traits for the services that produce that data.
//!
//! ## Key Components
//!
//! - `ImageRef`: canonical `repository@sha256:<hex>` reference
//! - `MetadataClient`: image → build detail; occurrence read/write
//! - `RepositoryClient`: build detail → commit and default branch facts
//! - `PayloadSigner`: opaque signing primitive for attestation payloads
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

pub mod clients;
mod error;
pub mod fakes;
mod image;
pub mod model;

pub use clients::{ClientResult, MetadataClient, PayloadSigner, RepositoryClient};
pub use error::CollaboratorError;
pub use image::{ImageRef, ImageRefError};
pub use model::{
    Branch, BuildDetail, Commit, CommitRef, CommitStatus, Occurrence, PolicySetId, PullRequest,
};
