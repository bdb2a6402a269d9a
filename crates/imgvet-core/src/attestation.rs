//! Attestation payloads and the occurrence publisher.
//!
//! A passed run is turned into a [`Statement`], wrapped in a signed
//! [`Envelope`] and written through the [`MetadataClient`] as exactly one
//! occurrence per (image, policy set).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use imgvet_metadata::{BuildDetail, MetadataClient, PayloadSigner, PolicySetId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::PublishError;
use crate::metrics::METRICS;
use crate::obs::{emit_occurrence_published, emit_publish_error};
use crate::report::{Publication, VetReport};

/// Payload type recorded in every envelope.
pub const STATEMENT_PAYLOAD_TYPE: &str = "application/vnd.imgvet.statement+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub repository: String,
    pub digest: String,
}

/// What an occurrence asserts: this image passed these policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Subject,
    pub policy_set: PolicySetId,
    pub checks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildDetail>,
    pub run_id: String,
    pub vetted_at: DateTime<Utc>,
}

impl Statement {
    pub fn from_report(report: &VetReport) -> Self {
        let mut checks: Vec<String> = report
            .passed_checks()
            .into_iter()
            .map(str::to_string)
            .collect();
        checks.sort();
        Self {
            subject: Subject {
                repository: report.image.repository().to_string(),
                digest: report.image.digest().to_string(),
            },
            policy_set: report.policy_set.clone(),
            checks,
            build: report.build.clone(),
            run_id: report.run_id.to_string(),
            vetted_at: report.finished_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    pub keyid: String,
    /// Base64 signature over `pae(payload_type, payload)`.
    pub sig: String,
}

/// Signed wrapper stored as the occurrence payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub payload_type: String,
    /// Base64 statement JSON.
    pub payload: String,
    pub signatures: Vec<EnvelopeSignature>,
}

impl Envelope {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PublishError> {
        serde_json::from_slice(bytes).map_err(|e| PublishError::Encoding(e.to_string()))
    }

    pub fn decode_statement(&self) -> Result<Statement, PublishError> {
        let raw = STANDARD
            .decode(&self.payload)
            .map_err(|e| PublishError::Encoding(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| PublishError::Encoding(e.to_string()))
    }
}

/// Pre-authentication encoding: the exact bytes that get signed.
///
/// `"DSSEv1" SP len(type) SP type SP len(body) SP body`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Outcome of a successful publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    AlreadyAttested,
}

impl From<PublishOutcome> for Publication {
    fn from(outcome: PublishOutcome) -> Self {
        match outcome {
            PublishOutcome::Published => Publication::Published,
            PublishOutcome::AlreadyAttested => Publication::AlreadyAttested,
        }
    }
}

/// Writes attestation occurrences for passed runs.
///
/// Idempotent per (image, policy set): an existing occurrence is left in
/// place and reported as `AlreadyAttested`.
#[derive(Clone)]
pub struct AttestationPublisher {
    metadata: Arc<dyn MetadataClient>,
    signer: Arc<dyn PayloadSigner>,
}

impl AttestationPublisher {
    pub fn new(metadata: Arc<dyn MetadataClient>, signer: Arc<dyn PayloadSigner>) -> Self {
        Self { metadata, signer }
    }

    /// Publish the occurrence for `report`.
    #[instrument(skip_all, fields(run_id = %report.run_id, image = %report.image))]
    pub async fn publish(&self, report: &VetReport) -> Result<PublishOutcome, PublishError> {
        if !report.overall.is_passed() {
            return Err(PublishError::NotPassed);
        }

        let existing = self
            .metadata
            .get_occurrence(&report.image, &report.policy_set)
            .await
            .map_err(PublishError::Lookup)?;
        if existing.is_some() {
            debug!(policy_set = %report.policy_set, "occurrence already present");
            return Ok(PublishOutcome::AlreadyAttested);
        }

        let envelope = self.sign(&Statement::from_report(report)).await?;
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| PublishError::Encoding(e.to_string()))?;

        self.metadata
            .publish_occurrence(&report.image, &report.policy_set, bytes)
            .await
            .map_err(PublishError::Write)?;
        Ok(PublishOutcome::Published)
    }

    /// Publish and record the result on the report. Safe to call again on
    /// a report whose earlier publication failed.
    pub async fn publish_into(&self, report: &mut VetReport) {
        let result = self.publish(report).await;
        self.record(report, result);
    }

    /// Store the result of a publish attempt on the report.
    pub fn record(&self, report: &mut VetReport, result: Result<PublishOutcome, PublishError>) {
        let publication = match result {
            Ok(outcome) => {
                if outcome == PublishOutcome::Published {
                    METRICS.inc_occurrences_published();
                    emit_occurrence_published(&report.run_id.0, report.policy_set.as_str());
                }
                Publication::from(outcome)
            }
            Err(PublishError::NotPassed) => Publication::NotAttempted,
            Err(error) => {
                METRICS.inc_publish_failures();
                emit_publish_error(&report.run_id.0, &error);
                Publication::Failed { error }
            }
        };
        report.publication = publication;
    }

    async fn sign(&self, statement: &Statement) -> Result<Envelope, PublishError> {
        let payload =
            serde_json::to_vec(statement).map_err(|e| PublishError::Encoding(e.to_string()))?;
        let sig = self
            .signer
            .sign(&pae(STATEMENT_PAYLOAD_TYPE, &payload))
            .await
            .map_err(PublishError::Signing)?;
        if sig.is_empty() {
            return Err(PublishError::EmptySignature);
        }
        Ok(Envelope {
            payload_type: STATEMENT_PAYLOAD_TYPE.to_string(),
            payload: STANDARD.encode(&payload),
            signatures: vec![EnvelopeSignature {
                keyid: self.signer.key_id().to_string(),
                sig: STANDARD.encode(sig),
            }],
        })
    }
}

impl std::fmt::Debug for AttestationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationPublisher")
            .field("key_id", &self.signer.key_id())
            .finish_non_exhaustive()
    }
}
