//! "approved" policy: the image was built from a reviewed, signed commit on
//! the production branch with green CI.

use std::sync::Arc;

use async_trait::async_trait;
use imgvet_metadata::{Branch, Commit, RepositoryClient};
use tracing::debug;

use crate::check::{Check, CheckContext, Collaborators};
use crate::error::CheckResult;

pub const APPROVED_CHECK: &str = "approved";

/// Individual findings behind an approval verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Approval {
    /// Commit appears in the default branch's history.
    pub on_default_branch: bool,
    pub signed: bool,
    /// Some merged pull request's merge commit is this commit.
    pub merged_via_pull_request: bool,
    /// Combined CI status is exactly `SUCCESS`.
    pub ci_passed: bool,
}

impl Approval {
    pub fn assess(commit: &Commit, default_branch: &Branch) -> Self {
        Self {
            on_default_branch: default_branch.contains(&commit.url),
            signed: commit.is_signed,
            merged_via_pull_request: commit
                .associated_pull_requests
                .iter()
                .any(|pr| pr.is_merged && pr.merge_commit.url == commit.url),
            ci_passed: commit.status.is_success(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.on_default_branch && self.signed && self.merged_via_pull_request && self.ci_passed
    }
}

pub struct ApprovedCheck {
    repository: Arc<dyn RepositoryClient>,
}

impl ApprovedCheck {
    pub fn new(repository: Arc<dyn RepositoryClient>) -> Self {
        Self { repository }
    }

    pub fn factory(collaborators: &Collaborators) -> Arc<dyn Check> {
        Arc::new(Self::new(Arc::clone(&collaborators.repository)))
    }
}

#[async_trait]
impl Check for ApprovedCheck {
    fn name(&self) -> &str {
        APPROVED_CHECK
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult<bool> {
        let (commit, default_branch) = tokio::try_join!(
            self.repository.get_commit(&ctx.build),
            self.repository.get_default_branch(&ctx.build),
        )?;

        let approval = Approval::assess(&commit, &default_branch);
        debug!(
            image = %ctx.image,
            commit = %commit.url,
            branch = %default_branch.name,
            on_default_branch = approval.on_default_branch,
            signed = approval.signed,
            merged_via_pull_request = approval.merged_via_pull_request,
            ci_passed = approval.ci_passed,
            "approval assessed"
        );
        Ok(approval.is_approved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::RunId;
    use crate::error::CheckError;
    use imgvet_metadata::fakes::MemoryRepositoryClient;
    use imgvet_metadata::{
        BuildDetail, CollaboratorError, CommitRef, CommitStatus, ImageRef, PullRequest,
    };

    const COMMIT_URL: &str = "https://github.com/example/service/commit/efgh6543";

    fn build() -> BuildDetail {
        BuildDetail::new("https://github.com/example/service", "efgh6543")
    }

    fn context() -> CheckContext {
        let image = ImageRef::parse(
            "gcr.io/test-project/apps/staging/service@sha256:73d506a23331fce5cb6f49bfb4c27450d2ef4878efce89f03a46b27372a88430",
        )
        .unwrap();
        CheckContext::new(RunId::new(), image, build())
    }

    struct Case {
        name: &'static str,
        default_branch_commits: Vec<CommitRef>,
        is_signed: bool,
        status: &'static str,
        pull_request: PullRequest,
        should_pass: bool,
    }

    fn merged_into(url: &str) -> PullRequest {
        PullRequest {
            is_merged: true,
            merge_commit: CommitRef::new(url),
        }
    }

    fn repository_for(case: &Case) -> MemoryRepositoryClient {
        let commit = Commit {
            url: COMMIT_URL.to_string(),
            status: CommitStatus::from(case.status),
            is_signed: case.is_signed,
            associated_pull_requests: vec![case.pull_request.clone()],
        };
        let branch = Branch {
            name: "production".to_string(),
            commit_refs: case.default_branch_commits.clone(),
        };
        MemoryRepositoryClient::new()
            .with_commit(&build(), commit)
            .with_default_branch(&build(), branch)
    }

    #[tokio::test]
    async fn test_approved_check_scenarios() {
        let cases = vec![
            Case {
                name: "should pass",
                default_branch_commits: vec![CommitRef::new(COMMIT_URL)],
                is_signed: true,
                status: "SUCCESS",
                pull_request: merged_into(COMMIT_URL),
                should_pass: true,
            },
            Case {
                name: "not built off default branch",
                default_branch_commits: vec![CommitRef::new("otherCommit")],
                is_signed: true,
                status: "SUCCESS",
                pull_request: merged_into(COMMIT_URL),
                should_pass: false,
            },
            Case {
                name: "commit not signed",
                default_branch_commits: vec![CommitRef::new(COMMIT_URL)],
                is_signed: false,
                status: "SUCCESS",
                pull_request: merged_into(COMMIT_URL),
                should_pass: false,
            },
            Case {
                name: "commit not a merge commit",
                default_branch_commits: vec![CommitRef::new(COMMIT_URL)],
                is_signed: true,
                status: "SUCCESS",
                pull_request: merged_into("otherURL"),
                should_pass: false,
            },
            Case {
                name: "ci not successful",
                default_branch_commits: vec![CommitRef::new(COMMIT_URL)],
                is_signed: true,
                status: "FAILURE",
                pull_request: merged_into(COMMIT_URL),
                should_pass: false,
            },
            Case {
                name: "ci still pending",
                default_branch_commits: vec![CommitRef::new(COMMIT_URL)],
                is_signed: true,
                status: "PENDING",
                pull_request: merged_into(COMMIT_URL),
                should_pass: false,
            },
            Case {
                name: "pull request not merged",
                default_branch_commits: vec![CommitRef::new(COMMIT_URL)],
                is_signed: true,
                status: "SUCCESS",
                pull_request: PullRequest {
                    is_merged: false,
                    merge_commit: CommitRef::new(COMMIT_URL),
                },
                should_pass: false,
            },
            Case {
                name: "commit deep in branch history",
                default_branch_commits: vec![
                    CommitRef::new("https://github.com/example/service/commit/newer2"),
                    CommitRef::new("https://github.com/example/service/commit/newer1"),
                    CommitRef::new(COMMIT_URL),
                ],
                is_signed: true,
                status: "SUCCESS",
                pull_request: merged_into(COMMIT_URL),
                should_pass: true,
            },
        ];

        for case in cases {
            let check = ApprovedCheck::new(Arc::new(repository_for(&case)));
            let verdict = check.evaluate(&context()).await;
            assert_eq!(
                verdict,
                Ok(case.should_pass),
                "case '{}' produced unexpected verdict",
                case.name
            );
        }
    }

    #[test]
    fn test_every_proper_subset_of_conditions_fails() {
        let satisfied = Commit {
            url: COMMIT_URL.to_string(),
            status: CommitStatus::Success,
            is_signed: true,
            associated_pull_requests: vec![merged_into(COMMIT_URL)],
        };
        let on_branch = Branch {
            name: "production".to_string(),
            commit_refs: vec![CommitRef::new(COMMIT_URL)],
        };
        let off_branch = Branch {
            name: "production".to_string(),
            commit_refs: vec![CommitRef::new("elsewhere")],
        };

        for mask in 0u8..16 {
            let mut commit = satisfied.clone();
            if mask & 0b0010 != 0 {
                commit.is_signed = false;
            }
            if mask & 0b0100 != 0 {
                commit.associated_pull_requests = vec![merged_into("elsewhere")];
            }
            if mask & 0b1000 != 0 {
                commit.status = CommitStatus::Failure;
            }
            let branch = if mask & 0b0001 != 0 { &off_branch } else { &on_branch };

            let approval = Approval::assess(&commit, branch);
            assert_eq!(
                approval.is_approved(),
                mask == 0,
                "violation mask {mask:04b} gave the wrong verdict"
            );
        }
    }

    #[tokio::test]
    async fn test_collaborator_error_is_not_a_policy_failure() {
        let case_repo = MemoryRepositoryClient::new()
            .with_default_branch(
                &build(),
                Branch {
                    name: "production".to_string(),
                    commit_refs: vec![CommitRef::new(COMMIT_URL)],
                },
            );
        case_repo.fail_commits(Some(CollaboratorError::unavailable("github", "401")));

        let check = ApprovedCheck::new(Arc::new(case_repo));
        let err = check.evaluate(&context()).await.unwrap_err();
        assert_eq!(
            err,
            CheckError::Collaborator(CollaboratorError::unavailable("github", "401"))
        );
    }

    #[tokio::test]
    async fn test_branch_lookup_error_short_circuits() {
        let repo = MemoryRepositoryClient::new().with_commit(
            &build(),
            Commit {
                url: COMMIT_URL.to_string(),
                status: CommitStatus::Success,
                is_signed: true,
                associated_pull_requests: vec![merged_into(COMMIT_URL)],
            },
        );
        // no default branch registered -> NotFound from the collaborator
        let check = ApprovedCheck::new(Arc::new(repo));
        let err = check.evaluate(&context()).await.unwrap_err();
        assert!(matches!(
            err,
            CheckError::Collaborator(CollaboratorError::NotFound { .. })
        ));
    }
}
