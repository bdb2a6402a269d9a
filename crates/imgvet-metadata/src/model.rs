//! Build and source-control data model shared by collaborators and checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::image::ImageRef;

// ---------------------------------------------------------------------------
// Build metadata
// ---------------------------------------------------------------------------

/// Link from an image to the repository and commit that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildDetail {
    pub repository_url: String,
    /// Commit identifier as recorded by the build system (usually a SHA).
    pub commit: String,
}

impl BuildDetail {
    pub fn new(repository_url: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            commit: commit.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source control
// ---------------------------------------------------------------------------

/// Combined CI status reported for a commit.
///
/// Only `Success` counts as a passing CI run. Values are matched exactly;
/// anything unrecognised is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommitStatus {
    Success,
    Pending,
    Failure,
    Error,
    Expected,
    Other(String),
}

impl CommitStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CommitStatus::Success => "SUCCESS",
            CommitStatus::Pending => "PENDING",
            CommitStatus::Failure => "FAILURE",
            CommitStatus::Error => "ERROR",
            CommitStatus::Expected => "EXPECTED",
            CommitStatus::Other(s) => s,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommitStatus::Success)
    }
}

impl From<&str> for CommitStatus {
    fn from(s: &str) -> Self {
        match s {
            "SUCCESS" => CommitStatus::Success,
            "PENDING" => CommitStatus::Pending,
            "FAILURE" => CommitStatus::Failure,
            "ERROR" => CommitStatus::Error,
            "EXPECTED" => CommitStatus::Expected,
            other => CommitStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for CommitStatus {
    fn from(s: String) -> Self {
        CommitStatus::from(s.as_str())
    }
}

impl From<CommitStatus> for String {
    fn from(status: CommitStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight pointer to a commit, compared by URL without fetching it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitRef {
    pub url: String,
}

impl CommitRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub is_merged: bool,
    pub merge_commit: CommitRef,
}

/// Snapshot of a commit as seen by the source-control provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub url: String,
    pub status: CommitStatus,
    pub is_signed: bool,
    #[serde(default)]
    pub associated_pull_requests: Vec<PullRequest>,
}

/// Branch history, most recent commit first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub commit_refs: Vec<CommitRef>,
}

impl Branch {
    /// Whether `url` appears anywhere in this branch's history.
    pub fn contains(&self, url: &str) -> bool {
        self.commit_refs.iter().any(|r| r.url == url)
    }
}

// ---------------------------------------------------------------------------
// Attestation occurrences
// ---------------------------------------------------------------------------

/// Identifier of the set of policies an occurrence attests to.
///
/// Derived from the sorted, de-duplicated policy names, so the same set in
/// any order yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicySetId(String);

impl PolicySetId {
    pub fn for_checks<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        names.sort();
        names.dedup();

        let mut hasher = Sha256::new();
        hasher.update(names.join(",").as_bytes());
        let digest = hex::encode(hasher.finalize());
        PolicySetId(format!("policy-set/{}", &digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PolicySetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable attestation record consumed by admission control.
///
/// Immutable once written; keyed by (subject, policy_set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub subject: ImageRef,
    pub policy_set: PolicySetId,
    pub signed_payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    /// Name of the note (policy set) this occurrence belongs to.
    pub fn note_name(&self) -> &str {
        self.policy_set.as_str()
    }
}

impl std::fmt::Display for Occurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for {}", self.policy_set, self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_status_exact_match() {
        assert!(CommitStatus::from("SUCCESS").is_success());
        assert!(!CommitStatus::from("success").is_success());
        assert!(!CommitStatus::from("PENDING").is_success());
        assert_eq!(
            CommitStatus::from("NEUTRAL"),
            CommitStatus::Other("NEUTRAL".to_string())
        );
    }

    #[test]
    fn test_commit_status_serde_as_string() {
        let json = serde_json::to_string(&CommitStatus::Failure).unwrap();
        assert_eq!(json, "\"FAILURE\"");
        let back: CommitStatus = serde_json::from_str("\"SUCCESS\"").unwrap();
        assert_eq!(back, CommitStatus::Success);
    }

    #[test]
    fn test_branch_contains_is_membership_not_position() {
        let branch = Branch {
            name: "production".to_string(),
            commit_refs: vec![
                CommitRef::new("https://example.com/c/3"),
                CommitRef::new("https://example.com/c/2"),
                CommitRef::new("https://example.com/c/1"),
            ],
        };
        assert!(branch.contains("https://example.com/c/1"));
        assert!(!branch.contains("https://example.com/c/4"));
    }

    #[test]
    fn test_policy_set_id_is_order_independent() {
        let a = PolicySetId::for_checks(["approved", "diy"]);
        let b = PolicySetId::for_checks(["diy", "approved", "diy"]);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("policy-set/"));
        assert_eq!(a.as_str().len(), "policy-set/".len() + 16);

        let c = PolicySetId::for_checks(["approved"]);
        assert_ne!(a, c);
    }
}
