//! Live GitHub client: REST for comment writes and PR lookup, GraphQL for
//! comment listing and the minimize mutation.

use std::time::Duration;

use async_trait::async_trait;
use github_comment_core::domain::{Comment, IssueComment, PullRequestRef};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::gateway::{CommentGateway, GatewayError};
use crate::transport::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_MAX_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const ERROR_BODY_MAX_CHARS: usize = 800;

const PULL_REQUEST_COMMENTS_QUERY: &str = "\
query($owner: String!, $name: String!, $number: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      comments(first: 100, after: $cursor) {
        nodes {
          id
          databaseId
          body
          isMinimized
          viewerCanMinimize
          author { login }
        }
        pageInfo { endCursor hasNextPage }
      }
    }
  }
}";

const ISSUE_COMMENTS_QUERY: &str = "\
query($owner: String!, $name: String!, $number: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    issue(number: $number) {
      comments(first: 100, after: $cursor) {
        nodes {
          id
          databaseId
          body
          isMinimized
          viewerCanMinimize
          author { login }
        }
        pageInfo { endCursor hasNextPage }
      }
    }
  }
}";

const MINIMIZE_COMMENT_MUTATION: &str = "\
mutation($input: MinimizeCommentInput!) {
  minimizeComment(input: $input) {
    minimizedComment { isMinimized viewerCanMinimize }
  }
}";

pub struct GithubClientParams {
    pub token: String,
    /// GitHub Enterprise REST base URL; the public API when unset.
    pub ghe_base_url: Option<String>,
    /// GitHub Enterprise GraphQL endpoint; the public endpoint when unset.
    pub ghe_graphql_endpoint: Option<String>,
}

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    graphql_endpoint: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubClient {
    pub fn new(params: &GithubClientParams) -> Result<Self, GatewayError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("github-comment"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", params.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header).map_err(|_| {
                GatewayError::Configuration {
                    message: "the token is not a valid authorization header value".to_string(),
                }
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| GatewayError::Configuration {
                message: error.to_string(),
            })?;
        let api_base = params
            .ghe_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let graphql_endpoint = params
            .ghe_graphql_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_GRAPHQL_ENDPOINT)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            api_base,
            graphql_endpoint,
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
        })
    }

    async fn request_text<F>(
        &self,
        operation: &'static str,
        mut request_builder: F,
    ) -> Result<String, GatewayError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match request_builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|source| {
                            GatewayError::Transport { operation, source }
                        });
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Err(GatewayError::Status {
                        operation,
                        status: status.as_u16(),
                        message: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(GatewayError::Transport {
                        operation,
                        source: error,
                    });
                }
            }
        }
    }

    async fn request_json<T, F>(
        &self,
        operation: &'static str,
        request_builder: F,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let text = self.request_text(operation, request_builder).await?;
        serde_json::from_str(&text).map_err(|source| GatewayError::Decode { operation, source })
    }

    async fn graphql<T>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: serde_json::Value,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let payload = json!({ "query": query, "variables": variables });
        let response: GraphQlResponse<T> = self
            .request_json(operation, || {
                self.http.post(&self.graphql_endpoint).json(&payload)
            })
            .await?;
        if !response.errors.is_empty() {
            let message = response
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GatewayError::GraphQl { operation, message });
        }
        response.data.ok_or(GatewayError::GraphQl {
            operation,
            message: "the response contained no data".to_string(),
        })
    }

    async fn send_comment(&self, comment: &Comment, body: &str) -> Result<(), GatewayError> {
        let (method, url, operation) = comment_request_parts(&self.api_base, comment);
        let payload = json!({ "body": body });
        self.request_text(operation, || {
            self.http
                .request(method.clone(), &url)
                .json(&payload)
        })
        .await?;
        Ok(())
    }

    async fn list_comments_shape(
        &self,
        shape: QueryShape,
        pr: &PullRequestRef,
    ) -> Result<Vec<IssueComment>, GatewayError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let (mut page, next_cursor) = self.list_comments_page(shape, pr, cursor.take()).await?;
            all.append(&mut page);
            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(all)
    }

    async fn list_comments_page(
        &self,
        shape: QueryShape,
        pr: &PullRequestRef,
        cursor: Option<String>,
    ) -> Result<(Vec<IssueComment>, Option<String>), GatewayError> {
        let (operation, query) = match shape {
            QueryShape::PullRequest => {
                ("list pull request comments", PULL_REQUEST_COMMENTS_QUERY)
            }
            QueryShape::Issue => ("list issue comments", ISSUE_COMMENTS_QUERY),
        };
        let variables = json!({
            "owner": pr.org,
            "name": pr.repo,
            "number": pr.pr_number,
            "cursor": cursor,
        });
        let data: CommentsData = self.graphql(operation, query, variables).await?;
        let holder = match shape {
            QueryShape::PullRequest => data.repository.and_then(|repo| repo.pull_request),
            QueryShape::Issue => data.repository.and_then(|repo| repo.issue),
        };
        page_from_holder(holder, operation)
    }
}

#[async_trait]
impl CommentGateway for GithubClient {
    async fn create_comment(&self, comment: &Comment) -> Result<(), GatewayError> {
        send_with_too_long_fallback(comment, |body| async move {
            self.send_comment(comment, &body).await
        })
        .await
    }

    async fn list_comments(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<IssueComment>, GatewayError> {
        // PRs and issues share a comment numbering space but not a query
        // shape; try the PR shape first and fall back on a genuine error.
        let pr_error = match self.list_comments_shape(QueryShape::PullRequest, pr).await {
            Ok(comments) => return Ok(comments),
            Err(error) => error,
        };
        match self.list_comments_shape(QueryShape::Issue, pr).await {
            Ok(comments) => Ok(comments),
            Err(issue_error) => Err(GatewayError::ListFallback {
                pr_error: Box::new(pr_error),
                issue_error: Box::new(issue_error),
            }),
        }
    }

    async fn hide_comment(&self, node_id: &str) -> Result<(), GatewayError> {
        let variables = json!({
            "input": { "subjectId": node_id, "classifier": "OUTDATED" },
        });
        let _data: MinimizeCommentData = self
            .graphql("minimize comment", MINIMIZE_COMMENT_MUTATION, variables)
            .await?;
        Ok(())
    }

    async fn get_authenticated_user(&self) -> Result<String, GatewayError> {
        #[derive(Deserialize)]
        struct Viewer {
            login: String,
        }
        let viewer: Viewer = self
            .request_json("get the authenticated user", || {
                self.http.get(format!("{}/user", self.api_base))
            })
            .await?;
        Ok(viewer.login)
    }

    async fn pr_number_with_sha(
        &self,
        org: &str,
        repo: &str,
        sha: &str,
    ) -> Result<Option<u64>, GatewayError> {
        #[derive(Deserialize)]
        struct AssociatedPullRequest {
            number: u64,
        }
        let prs: Vec<AssociatedPullRequest> = self
            .request_json("list pull requests associated with a commit", || {
                self.http
                    .get(format!(
                        "{}/repos/{org}/{repo}/commits/{sha}/pulls",
                        self.api_base
                    ))
                    .query(&[
                        ("state", "all"),
                        ("sort", "updated"),
                        ("direction", "desc"),
                        ("per_page", "1"),
                    ])
            })
            .await?;
        Ok(prs.first().map(|pr| pr.number))
    }
}

#[derive(Debug, Clone, Copy)]
enum QueryShape {
    PullRequest,
    Issue,
}

/// Send the primary body; on the remote's body-too-long rejection retry
/// exactly once with the alternate body when one is available. Any other
/// failure propagates untouched.
async fn send_with_too_long_fallback<F, Fut>(
    comment: &Comment,
    mut send: F,
) -> Result<(), GatewayError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<(), GatewayError>>,
{
    match send(comment.body.clone()).await {
        Err(error) if error.is_too_long_rejection() && !comment.body_for_too_long.is_empty() => {
            send(comment.body_for_too_long.clone()).await
        }
        result => result,
    }
}

/// Pick the REST endpoint for a create-or-edit call: issue comments when a
/// PR number is known, commit comments otherwise; PATCH when editing.
fn comment_request_parts(
    api_base: &str,
    comment: &Comment,
) -> (reqwest::Method, String, &'static str) {
    let org = &comment.org;
    let repo = &comment.repo;
    if comment.pr_number != 0 {
        if comment.comment_id != 0 {
            (
                reqwest::Method::PATCH,
                format!(
                    "{api_base}/repos/{org}/{repo}/issues/comments/{}",
                    comment.comment_id
                ),
                "edit issue comment",
            )
        } else {
            (
                reqwest::Method::POST,
                format!(
                    "{api_base}/repos/{org}/{repo}/issues/{}/comments",
                    comment.pr_number
                ),
                "create issue comment",
            )
        }
    } else if comment.comment_id != 0 {
        (
            reqwest::Method::PATCH,
            format!("{api_base}/repos/{org}/{repo}/comments/{}", comment.comment_id),
            "update commit comment",
        )
    } else {
        (
            reqwest::Method::POST,
            format!(
                "{api_base}/repos/{org}/{repo}/commits/{}/comments",
                comment.sha1
            ),
            "create commit comment",
        )
    }
}

/// Turn one page of a listing response into the read model. A missing
/// holder means the query shape did not match the target (e.g. the number is
/// an issue, not a PR) and triggers the caller's fallback; an empty node
/// list is a legitimate result and does not.
fn page_from_holder(
    holder: Option<CommentsHolder>,
    operation: &'static str,
) -> Result<(Vec<IssueComment>, Option<String>), GatewayError> {
    let holder = holder.ok_or(GatewayError::GraphQl {
        operation,
        message: "the comment target was not found".to_string(),
    })?;
    let comments = holder
        .comments
        .nodes
        .into_iter()
        .flatten()
        .map(IssueCommentNode::into_domain)
        .collect();
    let page_info = holder.comments.page_info;
    let next_cursor = if page_info.has_next_page {
        page_info.end_cursor
    } else {
        None
    };
    Ok((comments, next_cursor))
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorItem>,
}

#[derive(Deserialize)]
struct GraphQlErrorItem {
    message: String,
}

#[derive(Deserialize)]
struct CommentsData {
    repository: Option<RepositoryNode>,
}

#[derive(Deserialize)]
struct RepositoryNode {
    #[serde(default, rename = "pullRequest")]
    pull_request: Option<CommentsHolder>,
    #[serde(default)]
    issue: Option<CommentsHolder>,
}

#[derive(Deserialize)]
struct CommentsHolder {
    comments: CommentConnection,
}

#[derive(Deserialize)]
struct CommentConnection {
    #[serde(default)]
    nodes: Vec<Option<IssueCommentNode>>,
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(default, rename = "endCursor")]
    end_cursor: Option<String>,
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct IssueCommentNode {
    id: String,
    #[serde(default, rename = "databaseId")]
    database_id: Option<u64>,
    #[serde(default)]
    body: String,
    #[serde(default, rename = "isMinimized")]
    is_minimized: bool,
    #[serde(default, rename = "viewerCanMinimize")]
    viewer_can_minimize: bool,
    #[serde(default)]
    author: Option<AuthorNode>,
}

#[derive(Deserialize)]
struct AuthorNode {
    login: String,
}

impl IssueCommentNode {
    fn into_domain(self) -> IssueComment {
        IssueComment {
            id: self.id,
            database_id: self.database_id.unwrap_or(0),
            body: self.body,
            author_login: self.author.map(|author| author.login).unwrap_or_default(),
            is_minimized: self.is_minimized,
            viewer_can_minimize: self.viewer_can_minimize,
        }
    }
}

#[derive(Deserialize)]
struct MinimizeCommentData {
    #[serde(default, rename = "minimizeComment")]
    _minimize_comment: Option<serde_json::Value>,
}
