//! imgvet Core Library
//!
//! Concurrent policy vetting for container images. An [`Engine`] resolves an
//! image's build detail, fans its checks out under a concurrency limit,
//! aggregates a three-valued verdict and, for passed runs, publishes one
//! signed attestation occurrence per (image, policy set).

pub mod attestation;
pub mod cancel;
pub mod check;
pub mod checks;
pub mod config;
pub mod engine;
mod error;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod report;
pub mod telemetry;

pub use attestation::{
    pae, AttestationPublisher, Envelope, EnvelopeSignature, PublishOutcome, Statement, Subject,
    STATEMENT_PAYLOAD_TYPE,
};
pub use cancel::{CancelHandle, CancelToken};
pub use check::{Check, CheckContext, Collaborators, RunId};
pub use checks::{Approval, ApprovedCheck, DiyCheck, APPROVED_CHECK, DIY_CHECK};
pub use config::VetConfig;
pub use engine::{vet, Engine};
pub use error::{CheckError, CheckResult, PublishError, VetError, VetResult};
pub use registry::{CheckFactory, CheckRegistry};
pub use report::{aggregate, CheckOutcome, ErrorCause, Overall, Publication, VetReport};

pub use metrics::METRICS;
pub use obs::{
    emit_check_evaluated, emit_occurrence_published, emit_publish_error, emit_vet_finished,
    emit_vet_started, vet_span,
};
pub use telemetry::init_tracing;

/// imgvet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
