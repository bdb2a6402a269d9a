//! Vetting report: overall verdict, per-check outcomes and publication state.

use chrono::{DateTime, Utc};
use imgvet_metadata::{BuildDetail, CollaboratorError, ImageRef, PolicySetId};
use serde::{Deserialize, Serialize};

use crate::check::RunId;
use crate::error::{CheckError, PublishError};

/// Result of one check within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    /// `true` only for a clean pass; always `false` when `error` is set.
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
    pub duration_ms: u64,
}

impl CheckOutcome {
    pub fn verdict(name: impl Into<String>, passed: bool, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            passed,
            error: None,
            duration_ms,
        }
    }

    pub fn errored(name: impl Into<String>, error: CheckError, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Why a run could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ErrorCause {
    /// The build detail lookup failed; no checks were attempted.
    BuildDetailUnavailable { error: CollaboratorError },
    /// One or more checks could not be evaluated.
    CheckErrors { checks: Vec<String> },
    Cancelled,
    DeadlineExceeded,
    /// The run's task died before producing a report.
    Aborted { reason: String },
}

impl std::fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCause::BuildDetailUnavailable { error } => {
                write!(f, "build detail unavailable: {error}")
            }
            ErrorCause::CheckErrors { checks } => {
                write!(f, "checks errored: {}", checks.join(", "))
            }
            ErrorCause::Cancelled => f.write_str("cancelled"),
            ErrorCause::DeadlineExceeded => f.write_str("deadline exceeded"),
            ErrorCause::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// Three-valued overall result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Overall {
    Passed,
    Failed { failed_checks: Vec<String> },
    Errored { cause: ErrorCause },
}

impl Overall {
    pub fn is_passed(&self) -> bool {
        matches!(self, Overall::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Overall::Passed => "passed",
            Overall::Failed { .. } => "failed",
            Overall::Errored { .. } => "errored",
        }
    }
}

/// Fold per-check outcomes into an overall verdict.
///
/// Any error wins over any failure; the result depends only on the set of
/// outcomes, not their order.
pub fn aggregate(outcomes: &[CheckOutcome]) -> Overall {
    let mut errored: Vec<String> = outcomes
        .iter()
        .filter(|o| o.is_error())
        .map(|o| o.name.clone())
        .collect();
    if !errored.is_empty() {
        errored.sort();
        return Overall::Errored {
            cause: ErrorCause::CheckErrors { checks: errored },
        };
    }

    let mut failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.passed)
        .map(|o| o.name.clone())
        .collect();
    if !failed.is_empty() {
        failed.sort();
        return Overall::Failed {
            failed_checks: failed,
        };
    }

    Overall::Passed
}

/// What happened to the attestation for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Publication {
    /// The run did not pass, so nothing was written.
    NotAttempted,
    /// Publishing is switched off in the configuration.
    Disabled,
    Published,
    /// An occurrence for this image and policy set already existed.
    AlreadyAttested,
    Failed { error: PublishError },
}

impl Publication {
    pub fn is_failed(&self) -> bool {
        matches!(self, Publication::Failed { .. })
    }
}

impl std::fmt::Display for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Publication::NotAttempted | Publication::Disabled | Publication::AlreadyAttested => {
                f.write_str("no new occurrences generated")
            }
            Publication::Published => f.write_str("occurrence published"),
            Publication::Failed { error } => write!(f, "publish failed: {error}"),
        }
    }
}

/// Terminal report for one vetting run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetReport {
    pub run_id: RunId,
    pub image: ImageRef,
    pub policy_set: PolicySetId,
    pub overall: Overall,
    /// Present once the build detail has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildDetail>,
    /// One entry per configured check, in configured order.
    pub checks: Vec<CheckOutcome>,
    pub publication: Publication,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl VetReport {
    pub fn passed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Single-line summary naming every failing or erroring check.
    pub fn summary(&self) -> String {
        let verdict = match &self.overall {
            Overall::Passed => "passed".to_string(),
            Overall::Failed { failed_checks } => {
                format!("failed ({})", failed_checks.join(", "))
            }
            Overall::Errored { cause } => format!("errored ({cause})"),
        };
        format!(
            "{} {}: {}; {}",
            self.image, self.policy_set, verdict, self.publication
        )
    }

    /// Multi-line, human-readable rendering of the run.
    pub fn render_text(&self) -> String {
        let mut out = format!("{}\n", self.summary());
        for check in &self.checks {
            let status = match (&check.error, check.passed) {
                (Some(_), _) => "ERROR",
                (None, true) => "PASS",
                (None, false) => "FAIL",
            };
            out.push_str(&format!("  [{status}] {} ({} ms)", check.name, check.duration_ms));
            if let Some(err) = &check.error {
                out.push_str(&format!(": {err}"));
            }
            out.push('\n');
        }
        out
    }
}
