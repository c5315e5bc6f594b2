//! The `hide` controller: scan a PR's comments and minimize the ones the
//! configured condition selects.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use github_comment_core::condition;
use github_comment_core::config::Config;
use github_comment_core::domain::{IssueComment, PullRequestRef};
use github_comment_core::platform::{Platform, TargetRef};
use github_comment_github::CommentGateway;
use tracing::{debug, info, warn};

use crate::contexts::comment_scan_context;
use crate::post::merged_vars;
use crate::resolve::{complement_target, resolve_pr_number};
use crate::GetEnv;

#[derive(Debug, Clone, Default)]
pub struct HideOptions {
    pub org: String,
    pub repo: String,
    pub pr_number: u64,
    pub sha1: String,
    /// Explicit condition passed with `--condition`; wins over `hide_key`.
    pub condition: String,
    /// Config `hide` entry to use; `default` always exists.
    pub hide_key: String,
    pub vars: BTreeMap<String, serde_json::Value>,
}

pub struct HideController {
    gateway: Arc<dyn CommentGateway>,
    config: Config,
    platform: Option<Platform>,
    getenv: GetEnv,
}

impl HideController {
    pub fn new(
        gateway: Arc<dyn CommentGateway>,
        config: Config,
        platform: Option<Platform>,
        getenv: GetEnv,
    ) -> Self {
        Self {
            gateway,
            config,
            platform,
            getenv,
        }
    }

    pub async fn hide(&self, opts: &HideOptions) -> Result<()> {
        let mut target = TargetRef {
            org: opts.org.clone(),
            repo: opts.repo.clone(),
            pr_number: opts.pr_number,
            sha1: opts.sha1.clone(),
        };
        complement_target(
            &mut target,
            self.config.base.as_ref(),
            self.platform,
            &self.getenv,
        );
        resolve_pr_number(&mut target, self.gateway.as_ref()).await;
        if target.pr_number == 0 {
            bail!("a pull request or issue number is required to hide comments");
        }

        let condition = self.resolve_condition(opts)?;
        let vars = merged_vars(&self.config.vars, &opts.vars);
        let node_ids = self
            .list_hidden_comments(&target, &condition, &opts.hide_key, &vars)
            .await?;
        debug!(count = node_ids.len(), "comments which would be hidden");
        self.hide_comments(&node_ids).await;
        Ok(())
    }

    fn resolve_condition(&self, opts: &HideOptions) -> Result<String> {
        if !opts.condition.is_empty() {
            return Ok(opts.condition.clone());
        }
        match self.config.hide.get(&opts.hide_key) {
            Some(condition) => Ok(condition.clone()),
            None => bail!("invalid hide-key: {}", opts.hide_key),
        }
    }

    /// Scan the PR's comments and collect the node ids to minimize.
    ///
    /// Comments that cannot be minimized, or already are minimized, are
    /// excluded before the condition ever runs. When the login is resolvable the scan is
    /// further restricted to the token's own comments; a limited-scope token
    /// that cannot resolve its login skips that filter rather than failing,
    /// so it may hide a matching comment it did not post. A single comment's
    /// evaluation failure skips that comment only.
    async fn list_hidden_comments(
        &self,
        target: &TargetRef,
        condition: &str,
        hide_key: &str,
        vars: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<String>> {
        let program = condition::compile(condition).context("compile the hide condition")?;
        let login = match self.gateway.get_authenticated_user().await {
            Ok(login) => login,
            Err(error) => {
                warn!(error = %error, "get the authenticated user; skipping the author filter");
                String::new()
            }
        };
        let comments = self
            .gateway
            .list_comments(&PullRequestRef {
                org: target.org.clone(),
                repo: target.repo.clone(),
                pr_number: target.pr_number,
            })
            .await
            .context("list the comments to scan")?;
        debug!(
            count = comments.len(),
            org = %target.org,
            repo = %target.repo,
            pr_number = target.pr_number,
            "got the comments"
        );

        let mut node_ids = Vec::new();
        for comment in &comments {
            if is_excluded_comment(comment, &login) {
                debug!(node_id = %comment.id, login = %login, "exclude a comment");
                continue;
            }
            let ctx = comment_scan_context(comment, target, vars, Some(hide_key), &self.getenv);
            match program.run(&ctx) {
                Ok(true) => node_ids.push(comment.id.clone()),
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        node_id = %comment.id,
                        error = %error,
                        "judge whether an existing comment is hidden"
                    );
                }
            }
        }
        Ok(node_ids)
    }

    /// Minimize each selected comment; one failure never stops the batch.
    async fn hide_comments(&self, node_ids: &[String]) {
        let mut hidden = 0_usize;
        for node_id in node_ids {
            if let Err(error) = self.gateway.hide_comment(node_id).await {
                warn!(node_id = %node_id, error = %error, "hide an old comment");
                continue;
            }
            hidden += 1;
            info!(node_id = %node_id, "hid an old comment");
        }
        if hidden == 0 {
            info!("no comment is hidden");
        }
    }
}

/// Hard filters applied before the condition: the comment must be
/// minimizable and not already minimized; when `login` is known, it must be
/// the token's own comment.
fn is_excluded_comment(comment: &IssueComment, login: &str) -> bool {
    if !comment.viewer_can_minimize {
        return true;
    }
    if comment.is_minimized {
        return true;
    }
    !login.is_empty() && comment.author_login != login
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    use github_comment_core::config::Config;
    use github_comment_core::domain::IssueComment;
    use github_comment_core::metadata;
    use serde_json::json;

    use super::{is_excluded_comment, HideController, HideOptions};
    use crate::test_support::MockGateway;
    use crate::GetEnv;

    fn no_env() -> GetEnv {
        Arc::new(|_: &str| String::new())
    }

    fn controller_with(gateway: Arc<MockGateway>, config: Config) -> HideController {
        HideController::new(gateway, config, None, no_env())
    }

    fn default_config() -> Config {
        Config::find_and_load(None, std::path::Path::new("/nonexistent-wd"))
            .expect("default config")
    }

    fn base_opts() -> HideOptions {
        HideOptions {
            org: "foo".to_string(),
            repo: "bar".to_string(),
            pr_number: 3,
            sha1: "def".to_string(),
            hide_key: "default".to_string(),
            ..HideOptions::default()
        }
    }

    fn comment_with_sha(id: &str, sha: &str) -> IssueComment {
        let trailer = metadata::embed(&BTreeMap::from([(
            "SHA1".to_string(),
            json!(sha),
        )]))
        .expect("embed");
        IssueComment {
            id: id.to_string(),
            database_id: 1,
            body: format!("report\n{trailer}"),
            author_login: "ci-bot".to_string(),
            is_minimized: false,
            viewer_can_minimize: true,
        }
    }

    #[tokio::test]
    async fn functional_hide_minimizes_comments_with_an_outdated_embedded_sha() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![
                comment_with_sha("outdated", "abc"),
                comment_with_sha("current", "def"),
            ],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        controller.hide(&base_opts()).await.expect("hide");
        assert_eq!(gateway.hidden(), vec!["outdated".to_string()]);
    }

    #[tokio::test]
    async fn functional_hard_filters_apply_before_the_condition() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![
                IssueComment {
                    viewer_can_minimize: false,
                    ..comment_with_sha("not-minimizable", "abc")
                },
                IssueComment {
                    is_minimized: true,
                    ..comment_with_sha("already-minimized", "abc")
                },
                comment_with_sha("eligible", "abc"),
            ],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        controller.hide(&base_opts()).await.expect("hide");
        assert_eq!(gateway.hidden(), vec!["eligible".to_string()]);
    }

    #[tokio::test]
    async fn functional_foreign_comments_are_skipped_when_the_login_is_known() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![IssueComment {
                author_login: "someone-else".to_string(),
                ..comment_with_sha("foreign", "abc")
            }],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        controller.hide(&base_opts()).await.expect("hide");
        assert!(gateway.hidden().is_empty());
    }

    #[tokio::test]
    async fn regression_unresolvable_login_skips_the_author_filter_not_the_scan() {
        let gateway = Arc::new(MockGateway {
            login: None,
            comments: vec![IssueComment {
                author_login: "someone-else".to_string(),
                ..comment_with_sha("foreign", "abc")
            }],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        controller.hide(&base_opts()).await.expect("hide");
        assert_eq!(gateway.hidden(), vec!["foreign".to_string()]);
    }

    #[tokio::test]
    async fn regression_a_single_hide_failure_does_not_stop_the_batch() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![
                comment_with_sha("first", "abc"),
                comment_with_sha("second", "abc"),
            ],
            fail_hide_for: HashSet::from(["first".to_string()]),
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        controller.hide(&base_opts()).await.expect("hide");
        assert_eq!(gateway.hidden(), vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn functional_an_explicit_condition_wins_over_the_hide_key() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![comment_with_sha("current", "def")],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        let opts = HideOptions {
            condition: "true".to_string(),
            ..base_opts()
        };
        controller.hide(&opts).await.expect("hide");
        assert_eq!(gateway.hidden(), vec!["current".to_string()]);
    }

    #[tokio::test]
    async fn regression_an_unknown_hide_key_is_an_error() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), default_config());
        let opts = HideOptions {
            hide_key: "missing".to_string(),
            ..base_opts()
        };
        let error = controller.hide(&opts).await.expect_err("unknown key");
        assert!(error.to_string().contains("invalid hide-key"));
    }

    #[tokio::test]
    async fn regression_a_malformed_condition_is_fatal() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), default_config());
        let opts = HideOptions {
            condition: "((".to_string(),
            ..base_opts()
        };
        let error = controller.hide(&opts).await.expect_err("compile failure");
        assert!(error.to_string().contains("compile the hide condition"));
    }

    #[tokio::test]
    async fn functional_hide_resolves_the_pr_number_from_the_sha() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            pr_for_sha: Some(12),
            comments: vec![comment_with_sha("outdated", "abc")],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), default_config());
        let opts = HideOptions {
            pr_number: 0,
            ..base_opts()
        };
        controller.hide(&opts).await.expect("hide");
        assert_eq!(gateway.hidden(), vec!["outdated".to_string()]);
    }

    #[tokio::test]
    async fn regression_hide_without_a_resolvable_pr_is_rejected() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), default_config());
        let opts = HideOptions {
            pr_number: 0,
            sha1: String::new(),
            ..base_opts()
        };
        let error = controller.hide(&opts).await.expect_err("no pr");
        assert!(error.to_string().contains("number is required"));
    }

    #[test]
    fn unit_is_excluded_comment_covers_the_three_filters() {
        let eligible = comment_with_sha("c", "abc");
        assert!(!is_excluded_comment(&eligible, "ci-bot"));
        assert!(!is_excluded_comment(&eligible, ""));
        assert!(is_excluded_comment(&eligible, "someone-else"));
        let minimized = IssueComment {
            is_minimized: true,
            ..comment_with_sha("c", "abc")
        };
        assert!(is_excluded_comment(&minimized, ""));
        let locked = IssueComment {
            viewer_can_minimize: false,
            ..comment_with_sha("c", "abc")
        };
        assert!(is_excluded_comment(&locked, ""));
    }
}
