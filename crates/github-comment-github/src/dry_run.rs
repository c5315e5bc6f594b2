//! Gateway that logs intended actions instead of calling the network.
//!
//! Used for `--dry-run` and for `--skip-no-token` when no token is
//! available. Same contract as the live client, so controllers cannot tell
//! the difference.

use async_trait::async_trait;
use github_comment_core::domain::{Comment, IssueComment, PullRequestRef};
use tracing::info;

use crate::gateway::{CommentGateway, GatewayError};

pub struct DryRunGateway {
    /// Suppresses the body echo on stderr.
    silent: bool,
}

impl DryRunGateway {
    pub fn new(silent: bool) -> Self {
        Self { silent }
    }
}

#[async_trait]
impl CommentGateway for DryRunGateway {
    async fn create_comment(&self, comment: &Comment) -> Result<(), GatewayError> {
        info!(
            org = %comment.org,
            repo = %comment.repo,
            pr_number = comment.pr_number,
            sha1 = %comment.sha1,
            comment_id = comment.comment_id,
            "dry run: skip sending a comment"
        );
        if !self.silent {
            eprintln!("{}", comment.body);
        }
        Ok(())
    }

    async fn list_comments(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<IssueComment>, GatewayError> {
        info!(
            org = %pr.org,
            repo = %pr.repo,
            pr_number = pr.pr_number,
            "dry run: skip listing comments"
        );
        Ok(Vec::new())
    }

    async fn hide_comment(&self, node_id: &str) -> Result<(), GatewayError> {
        info!(node_id, "dry run: skip hiding a comment");
        Ok(())
    }

    async fn get_authenticated_user(&self) -> Result<String, GatewayError> {
        Ok(String::new())
    }

    async fn pr_number_with_sha(
        &self,
        org: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Option<u64>, GatewayError> {
        info!(org, repo, sha, "dry run: skip resolving the pull request");
        Ok(None)
    }
}
