//! Gateway contract consumed by the decision controllers.

use async_trait::async_trait;
use github_comment_core::domain::{Comment, IssueComment, PullRequestRef};
use thiserror::Error;

/// Fragment of the remote validation message that identifies a
/// body-too-long rejection.
pub const TOO_LONG_MESSAGE_FRAGMENT: &str = "Body is too long";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("github api {operation} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("github api {operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("decode the github {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("graphql {operation} failed: {message}")]
    GraphQl {
        operation: &'static str,
        message: String,
    },
    #[error("get pull request or issue comments: {pr_error}, {issue_error}")]
    ListFallback {
        pr_error: Box<GatewayError>,
        issue_error: Box<GatewayError>,
    },
    #[error("build the github client: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    /// True when the remote rejected the body for exceeding the comment
    /// length limit, the one failure the gateway transparently retries with
    /// the alternate body.
    pub fn is_too_long_rejection(&self) -> bool {
        match self {
            GatewayError::Status {
                status, message, ..
            } => *status == 422 && message.contains(TOO_LONG_MESSAGE_FRAGMENT),
            _ => false,
        }
    }
}

/// Operations the controllers need from GitHub.
///
/// `create_comment` edits instead of creating when `comment_id` is set, and
/// targets the commit-comment endpoints when `pr_number` is zero.
/// `pr_number_with_sha` resolves `Ok(None)` when no pull request is
/// associated with the commit; callers treat that as "stay commit-scoped".
#[async_trait]
pub trait CommentGateway: Send + Sync {
    async fn create_comment(&self, comment: &Comment) -> Result<(), GatewayError>;
    async fn list_comments(&self, pr: &PullRequestRef)
        -> Result<Vec<IssueComment>, GatewayError>;
    async fn hide_comment(&self, node_id: &str) -> Result<(), GatewayError>;
    async fn get_authenticated_user(&self) -> Result<String, GatewayError>;
    async fn pr_number_with_sha(
        &self,
        org: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Option<u64>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::{GatewayError, TOO_LONG_MESSAGE_FRAGMENT};

    #[test]
    fn unit_too_long_rejection_requires_status_and_message() {
        let rejection = GatewayError::Status {
            operation: "create issue comment",
            status: 422,
            message: format!(
                "{{\"message\":\"Validation Failed\",\"errors\":[{{\"message\":\"{TOO_LONG_MESSAGE_FRAGMENT} (maximum is 65536 characters)\"}}]}}"
            ),
        };
        assert!(rejection.is_too_long_rejection());

        let other_validation = GatewayError::Status {
            operation: "create issue comment",
            status: 422,
            message: "Validation Failed".to_string(),
        };
        assert!(!other_validation.is_too_long_rejection());

        let not_found = GatewayError::Status {
            operation: "create issue comment",
            status: 404,
            message: TOO_LONG_MESSAGE_FRAGMENT.to_string(),
        };
        assert!(!not_found.is_too_long_rejection());
    }

    #[test]
    fn unit_list_fallback_error_names_both_failures() {
        let combined = GatewayError::ListFallback {
            pr_error: Box::new(GatewayError::GraphQl {
                operation: "list pull request comments",
                message: "pr shape failed".to_string(),
            }),
            issue_error: Box::new(GatewayError::GraphQl {
                operation: "list issue comments",
                message: "issue shape failed".to_string(),
            }),
        };
        let text = combined.to_string();
        assert!(text.contains("pr shape failed"));
        assert!(text.contains("issue shape failed"));
    }
}
