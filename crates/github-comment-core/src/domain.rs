use std::collections::BTreeMap;

/// A comment the tool has decided to send. Built once per decision cycle and
/// handed to the gateway; never persisted.
#[derive(Debug, Clone, Default)]
pub struct Comment {
    pub org: String,
    pub repo: String,
    /// Pull request or issue number. Zero means the comment is commit-scoped.
    pub pr_number: u64,
    pub sha1: String,
    pub body: String,
    /// Alternate body used when the remote API rejects `body` as too long.
    /// Empty means no alternate is available.
    pub body_for_too_long: String,
    /// Existing comment to edit. Zero means a new comment is created.
    pub comment_id: u64,
    pub template_key: String,
    pub vars: BTreeMap<String, serde_json::Value>,
}

/// Read model for an existing comment returned by the listing query.
#[derive(Debug, Clone, Default)]
pub struct IssueComment {
    /// Opaque node id used by mutations.
    pub id: String,
    /// Numeric id used by the edit endpoints.
    pub database_id: u64,
    pub body: String,
    pub author_login: String,
    pub is_minimized: bool,
    pub viewer_can_minimize: bool,
}

/// Target of a comment-listing call.
#[derive(Debug, Clone, Default)]
pub struct PullRequestRef {
    pub org: String,
    pub repo: String,
    pub pr_number: u64,
}

/// Captured outcome of one wrapped command execution. Immutable once
/// produced; feeds the exec condition and template contexts.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i32,
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub combined_output: String,
}
