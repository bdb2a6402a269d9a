//! "diy" policy: the image lives in one of our own registries.

use std::sync::Arc;

use async_trait::async_trait;

use crate::check::{Check, CheckContext};
use crate::error::CheckResult;

pub const DIY_CHECK: &str = "diy";

/// Passes when the image repository path sits under a trusted prefix.
///
/// Prefixes match on path-segment boundaries: `gcr.io/team` trusts
/// `gcr.io/team/app` but not `gcr.io/teamster/app`. An empty prefix list
/// trusts nothing.
#[derive(Debug, Clone, Default)]
pub struct DiyCheck {
    trusted_prefixes: Vec<String>,
}

impl DiyCheck {
    pub fn new<I, S>(trusted_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_prefixes: trusted_prefixes
                .into_iter()
                .map(|p| p.into().trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn into_check(self) -> Arc<dyn Check> {
        Arc::new(self)
    }

    fn is_trusted(&self, repository: &str) -> bool {
        self.trusted_prefixes.iter().any(|prefix| {
            repository
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

#[async_trait]
impl Check for DiyCheck {
    fn name(&self) -> &str {
        DIY_CHECK
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult<bool> {
        Ok(self.is_trusted(ctx.image.repository()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::RunId;
    use imgvet_metadata::{BuildDetail, ImageRef};

    fn context(repository: &str) -> CheckContext {
        let image = ImageRef::parse(&format!("{repository}@sha256:{}", "ab".repeat(32))).unwrap();
        CheckContext::new(RunId::new(), image, BuildDetail::new("repo", "sha"))
    }

    #[tokio::test]
    async fn test_trusted_prefix_passes() {
        let check = DiyCheck::new(["gcr.io/team/"]);
        assert_eq!(check.evaluate(&context("gcr.io/team/app")).await, Ok(true));
        assert_eq!(
            check.evaluate(&context("gcr.io/team/nested/app")).await,
            Ok(true)
        );
    }

    #[tokio::test]
    async fn test_prefix_respects_segment_boundary() {
        let check = DiyCheck::new(["gcr.io/team"]);
        assert_eq!(
            check.evaluate(&context("gcr.io/teamster/app")).await,
            Ok(false)
        );
        assert_eq!(check.evaluate(&context("gcr.io/team")).await, Ok(false));
    }

    #[tokio::test]
    async fn test_empty_prefix_list_trusts_nothing() {
        let check = DiyCheck::new(Vec::<String>::new());
        assert_eq!(check.evaluate(&context("gcr.io/team/app")).await, Ok(false));

        let blank = DiyCheck::new(["", "/"]);
        assert_eq!(blank.evaluate(&context("gcr.io/team/app")).await, Ok(false));
    }
}
