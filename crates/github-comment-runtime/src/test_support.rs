//! In-memory gateway for controller tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use github_comment_core::domain::{Comment, IssueComment, PullRequestRef};
use github_comment_github::{CommentGateway, GatewayError};

#[derive(Default)]
pub(crate) struct MockGateway {
    pub comments: Vec<IssueComment>,
    /// `None` makes `get_authenticated_user` fail, mimicking a limited-scope
    /// token.
    pub login: Option<String>,
    pub pr_for_sha: Option<u64>,
    pub list_fails: bool,
    pub create_fails: bool,
    pub fail_hide_for: HashSet<String>,
    pub created: Mutex<Vec<Comment>>,
    pub hidden: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn created(&self) -> Vec<Comment> {
        self.created.lock().expect("created lock").clone()
    }

    pub fn hidden(&self) -> Vec<String> {
        self.hidden.lock().expect("hidden lock").clone()
    }
}

#[async_trait]
impl CommentGateway for MockGateway {
    async fn create_comment(&self, comment: &Comment) -> Result<(), GatewayError> {
        if self.create_fails {
            return Err(GatewayError::Status {
                operation: "create issue comment",
                status: 500,
                message: "mock create failure".to_string(),
            });
        }
        self.created.lock().expect("created lock").push(comment.clone());
        Ok(())
    }

    async fn list_comments(
        &self,
        _pr: &PullRequestRef,
    ) -> Result<Vec<IssueComment>, GatewayError> {
        if self.list_fails {
            return Err(GatewayError::GraphQl {
                operation: "list pull request comments",
                message: "mock list failure".to_string(),
            });
        }
        Ok(self.comments.clone())
    }

    async fn hide_comment(&self, node_id: &str) -> Result<(), GatewayError> {
        if self.fail_hide_for.contains(node_id) {
            return Err(GatewayError::GraphQl {
                operation: "minimize comment",
                message: "mock hide failure".to_string(),
            });
        }
        self.hidden
            .lock()
            .expect("hidden lock")
            .push(node_id.to_string());
        Ok(())
    }

    async fn get_authenticated_user(&self) -> Result<String, GatewayError> {
        self.login.clone().ok_or(GatewayError::Status {
            operation: "get the authenticated user",
            status: 403,
            message: "mock token cannot resolve the user".to_string(),
        })
    }

    async fn pr_number_with_sha(
        &self,
        _org: &str,
        _repo: &str,
        _sha: &str,
    ) -> Result<Option<u64>, GatewayError> {
        Ok(self.pr_for_sha)
    }
}
