//! Shared target resolution: flags win over config defaults, which win over
//! CI platform environment variables; a lone SHA1 is upgraded to a PR number
//! through the gateway when possible.

use github_comment_core::config::BaseConfig;
use github_comment_core::platform::{Platform, TargetRef};
use github_comment_github::CommentGateway;
use tracing::{debug, warn};

use crate::GetEnv;

pub(crate) fn complement_target(
    target: &mut TargetRef,
    base: Option<&BaseConfig>,
    platform: Option<Platform>,
    getenv: &GetEnv,
) {
    if let Some(base) = base {
        if target.org.is_empty() {
            target.org = base.org.clone();
        }
        if target.repo.is_empty() {
            target.repo = base.repo.clone();
        }
    }
    if let Some(platform) = platform {
        platform.complement(target, &|name| getenv(name));
    }
}

/// Best-effort upgrade of a commit-scoped target to a PR-scoped one.
/// Failure degrades to commit-scoped posting; it is never fatal.
pub(crate) async fn resolve_pr_number(target: &mut TargetRef, gateway: &dyn CommentGateway) {
    if target.pr_number != 0 || target.sha1.is_empty() {
        return;
    }
    if target.org.is_empty() || target.repo.is_empty() {
        return;
    }
    match gateway
        .pr_number_with_sha(&target.org, &target.repo, &target.sha1)
        .await
    {
        Ok(Some(number)) => {
            debug!(number, sha1 = %target.sha1, "resolved the pull request from the commit");
            target.pr_number = number;
        }
        Ok(None) => {
            debug!(sha1 = %target.sha1, "no associated pull request; staying commit-scoped");
        }
        Err(error) => {
            warn!(
                sha1 = %target.sha1,
                error = %error,
                "list the pull requests associated with the commit"
            );
        }
    }
}
