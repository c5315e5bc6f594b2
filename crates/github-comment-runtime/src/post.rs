//! The `post` controller: decide what to post and where, then send exactly
//! one create-or-edit call.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use github_comment_core::condition;
use github_comment_core::config::{Config, PostConfig};
use github_comment_core::domain::{Comment, PullRequestRef};
use github_comment_core::metadata;
use github_comment_core::platform::{Platform, TargetRef};
use github_comment_core::template;
use github_comment_github::CommentGateway;
use serde_json::json;
use tracing::warn;

use crate::contexts::{comment_scan_context, PostTemplateContext};
use crate::resolve::{complement_target, resolve_pr_number};
use crate::GetEnv;

#[derive(Debug, Clone, Default)]
pub struct PostOptions {
    pub org: String,
    pub repo: String,
    pub pr_number: u64,
    pub sha1: String,
    /// Explicit template passed with `--template`; wins over everything.
    pub template: String,
    pub template_key: String,
    /// Template read from standard input with `--stdin-template`; wins over
    /// the config entry.
    pub stdin_template: Option<String>,
    pub update_condition: Option<String>,
    pub vars: BTreeMap<String, serde_json::Value>,
}

pub struct PostController {
    gateway: Arc<dyn CommentGateway>,
    config: Config,
    platform: Option<Platform>,
    getenv: GetEnv,
}

impl PostController {
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

    pub async fn post(&self, opts: &PostOptions) -> Result<()> {
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
        validate_target(&target)?;

        let post_config = self.resolve_post_config(opts)?;
        let update_condition = opts
            .update_condition
            .clone()
            .or_else(|| post_config.update_condition.clone());

        let vars = merged_vars(&self.config.vars, &opts.vars);
        let templates = template::merge_templates(
            &build_link(self.platform, &self.getenv),
            &self.config.templates,
        );
        let data = PostTemplateContext {
            org: &target.org,
            repo: &target.repo,
            pr_number: target.pr_number,
            sha1: &target.sha1,
            template_key: &opts.template_key,
            vars: &vars,
        };
        let body = template::render(&post_config.template, &templates, &data)
            .context("render the comment template")?;
        let body_for_too_long = match &post_config.template_for_too_long {
            Some(tpl) => template::render(tpl, &templates, &data)
                .context("render the too-long fallback template")?,
            None => String::new(),
        };

        let trailer = metadata_trailer(
            &target,
            &opts.template_key,
            &post_config.embedded_var_names,
            &vars,
            self.platform,
            &self.getenv,
        )?;
        let body = append_trailer(body, &trailer);
        let body_for_too_long = if body_for_too_long.is_empty() {
            body_for_too_long
        } else {
            append_trailer(body_for_too_long, &trailer)
        };

        send_with_update_scan(
            self.gateway.as_ref(),
            &target,
            update_condition.as_deref(),
            &opts.template_key,
            &vars,
            body,
            body_for_too_long,
            &self.getenv,
        )
        .await
    }

    fn resolve_post_config(&self, opts: &PostOptions) -> Result<PostConfig> {
        if !opts.template.is_empty() {
            return Ok(PostConfig {
                template: opts.template.clone(),
                ..PostConfig::default()
            });
        }
        if let Some(stdin) = &opts.stdin_template {
            return Ok(PostConfig {
                template: stdin.clone(),
                ..PostConfig::default()
            });
        }
        match self.config.post.get(&opts.template_key) {
            Some(config) => Ok(config.clone()),
            None => bail!("the post template isn't found: {}", opts.template_key),
        }
    }
}

pub(crate) fn validate_target(target: &TargetRef) -> Result<()> {
    if target.org.is_empty() {
        bail!("the organization is required: pass --org or set base.org in the configuration");
    }
    if target.repo.is_empty() {
        bail!("the repository is required: pass --repo or set base.repo in the configuration");
    }
    if target.pr_number == 0 && target.sha1.is_empty() {
        bail!("a pull request number or a commit SHA1 is required");
    }
    Ok(())
}

pub(crate) fn merged_vars(
    config_vars: &BTreeMap<String, serde_json::Value>,
    option_vars: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, serde_json::Value> {
    let mut merged = config_vars.clone();
    for (name, value) in option_vars {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

pub(crate) fn build_link(platform: Option<Platform>, getenv: &GetEnv) -> String {
    platform
        .map(|platform| platform.build_link(&|name| getenv(name)))
        .unwrap_or_default()
}

/// Build the metadata trailer from the commit, the template key, and the
/// subset of vars named in `embedded_var_names`, enriched with CI job
/// identifiers when a platform was detected.
pub(crate) fn metadata_trailer(
    target: &TargetRef,
    template_key: &str,
    embedded_var_names: &[String],
    vars: &BTreeMap<String, serde_json::Value>,
    platform: Option<Platform>,
    getenv: &GetEnv,
) -> Result<String> {
    let mut data = BTreeMap::new();
    data.insert("SHA1".to_string(), json!(target.sha1));
    data.insert("TemplateKey".to_string(), json!(template_key));
    let embedded: BTreeMap<String, serde_json::Value> = embedded_var_names
        .iter()
        .filter_map(|name| vars.get(name).map(|value| (name.clone(), value.clone())))
        .collect();
    if !embedded.is_empty() {
        data.insert("Vars".to_string(), json!(embedded));
    }
    if let Some(platform) = platform {
        metadata::set_ci_env(platform.id(), |name| getenv(name), &mut data);
    }
    metadata::embed(&data).context("serialize the embedded metadata")
}

pub(crate) fn append_trailer(mut body: String, trailer: &str) -> String {
    if !body.ends_with('\n') {
        body.push('\n');
    }
    body.push_str(trailer);
    body
}

/// Send the rendered bodies, editing an existing comment when the update
/// condition selects one.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn send_with_update_scan(
    gateway: &dyn CommentGateway,
    target: &TargetRef,
    update_condition: Option<&str>,
    template_key: &str,
    vars: &BTreeMap<String, serde_json::Value>,
    body: String,
    body_for_too_long: String,
    getenv: &GetEnv,
) -> Result<()> {
    let comment_id = match update_condition {
        Some(expression) if target.pr_number != 0 => {
            find_update_target(gateway, target, expression, vars, getenv).await?
        }
        _ => 0,
    };
    let comment = Comment {
        org: target.org.clone(),
        repo: target.repo.clone(),
        pr_number: target.pr_number,
        sha1: target.sha1.clone(),
        body,
        body_for_too_long,
        comment_id,
        template_key: template_key.to_string(),
        vars: vars.clone(),
    };
    gateway
        .create_comment(&comment)
        .await
        .context("send the comment")?;
    Ok(())
}

/// Scan existing comments for the one to edit.
///
/// Minimized comments and, when the login is resolvable, comments by other
/// authors are excluded. Among the remaining matches the last one in list
/// order wins: both listing shapes return comments in ascending creation
/// order, so that is the newest comment a previous run left behind. A
/// limited-scope token that cannot resolve its own login skips the author
/// filter rather than failing, which means it may edit a matching comment it
/// did not post.
async fn find_update_target(
    gateway: &dyn CommentGateway,
    target: &TargetRef,
    expression: &str,
    vars: &BTreeMap<String, serde_json::Value>,
    getenv: &GetEnv,
) -> Result<u64> {
    let program = condition::compile(expression).context("compile the update condition")?;
    let login = match gateway.get_authenticated_user().await {
        Ok(login) => login,
        Err(error) => {
            warn!(error = %error, "get the authenticated user; skipping the author filter");
            String::new()
        }
    };
    let comments = match gateway
        .list_comments(&PullRequestRef {
            org: target.org.clone(),
            repo: target.repo.clone(),
            pr_number: target.pr_number,
        })
        .await
    {
        Ok(comments) => comments,
        Err(error) => {
            warn!(error = %error, "list the existing comments; posting a new comment instead");
            return Ok(0);
        }
    };

    let mut candidate = 0_u64;
    for comment in &comments {
        if comment.is_minimized {
            continue;
        }
        if !login.is_empty() && comment.author_login != login {
            continue;
        }
        let ctx = comment_scan_context(comment, target, vars, None, getenv);
        match program.run(&ctx) {
            Ok(true) => candidate = comment.database_id,
            Ok(false) => {}
            Err(error) => {
                warn!(
                    node_id = %comment.id,
                    error = %error,
                    "evaluate the update condition; skipping the comment"
                );
            }
        }
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use github_comment_core::config::Config;
    use github_comment_core::domain::IssueComment;
    use github_comment_core::metadata;
    use serde_json::json;

    use super::{PostController, PostOptions};
    use crate::test_support::MockGateway;
    use crate::GetEnv;

    fn no_env() -> GetEnv {
        Arc::new(|_: &str| String::new())
    }

    fn controller_with(gateway: Arc<MockGateway>, config: Config) -> PostController {
        PostController::new(gateway, config, None, no_env())
    }

    fn base_opts() -> PostOptions {
        PostOptions {
            org: "foo".to_string(),
            repo: "bar".to_string(),
            pr_number: 3,
            sha1: "abc".to_string(),
            template: "hello {{ Org }}/{{ Repo }}".to_string(),
            template_key: "default".to_string(),
            ..PostOptions::default()
        }
    }

    fn own_comment(id: &str, database_id: u64, body: &str) -> IssueComment {
        IssueComment {
            id: id.to_string(),
            database_id,
            body: body.to_string(),
            author_login: "ci-bot".to_string(),
            is_minimized: false,
            viewer_can_minimize: true,
        }
    }

    #[tokio::test]
    async fn functional_post_renders_the_template_and_appends_the_trailer() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        controller.post(&base_opts()).await.expect("post");

        let created = gateway.created();
        assert_eq!(created.len(), 1);
        let comment = &created[0];
        assert!(comment.body.starts_with("hello foo/bar\n"));
        let meta = metadata::extract(&comment.body).expect("trailer");
        assert_eq!(meta.get("SHA1"), Some(&json!("abc")));
        assert_eq!(meta.get("TemplateKey"), Some(&json!("default")));
        assert_eq!(comment.pr_number, 3);
        assert_eq!(comment.comment_id, 0);
    }

    #[tokio::test]
    async fn functional_post_resolves_the_config_template_by_key() {
        let config: Config = serde_yaml::from_str(
            r##"
templates:
  header: "# {{ Org }}/{{ Repo }}"
post:
  greet:
    template: "{% include \"header\" %}\n{{ Vars.name }}"
"##,
        )
        .expect("config");
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), config);
        let opts = PostOptions {
            template: String::new(),
            template_key: "greet".to_string(),
            vars: BTreeMap::from([("name".to_string(), json!("world"))]),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        let created = gateway.created();
        assert!(created[0].body.starts_with("# foo/bar\nworld\n"));
    }

    #[tokio::test]
    async fn functional_post_fails_for_an_unknown_template_key() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            template: String::new(),
            template_key: "missing".to_string(),
            ..base_opts()
        };
        let error = controller.post(&opts).await.expect_err("unknown key");
        assert!(error.to_string().contains("isn't found"));
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn functional_update_condition_edits_the_last_matching_comment() {
        let trailer = metadata::embed(&BTreeMap::from([(
            "SHA1".to_string(),
            json!("abc"),
        )]))
        .expect("embed");
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![
                own_comment("n1", 11, &format!("first\n{trailer}")),
                own_comment("n2", 22, "no metadata"),
                own_comment("n3", 33, &format!("third\n{trailer}")),
            ],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            update_condition: Some("Comment.HasMeta".to_string()),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        let created = gateway.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].comment_id, 33);
    }

    #[tokio::test]
    async fn functional_update_scan_skips_minimized_and_foreign_comments() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            comments: vec![
                IssueComment {
                    is_minimized: true,
                    ..own_comment("n1", 11, "minimized")
                },
                IssueComment {
                    author_login: "someone-else".to_string(),
                    ..own_comment("n2", 22, "foreign")
                },
            ],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            update_condition: Some("true".to_string()),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        assert_eq!(gateway.created()[0].comment_id, 0);
    }

    #[tokio::test]
    async fn regression_unresolvable_login_skips_the_author_filter_only() {
        let gateway = Arc::new(MockGateway {
            login: None,
            comments: vec![IssueComment {
                author_login: "someone-else".to_string(),
                ..own_comment("n1", 11, "foreign")
            }],
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            update_condition: Some("true".to_string()),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        assert_eq!(gateway.created()[0].comment_id, 11);
    }

    #[tokio::test]
    async fn regression_update_scan_list_failure_degrades_to_a_new_comment() {
        let gateway = Arc::new(MockGateway {
            login: Some("ci-bot".to_string()),
            list_fails: true,
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            update_condition: Some("true".to_string()),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        assert_eq!(gateway.created()[0].comment_id, 0);
    }

    #[tokio::test]
    async fn functional_post_resolves_the_pr_number_from_the_sha() {
        let gateway = Arc::new(MockGateway {
            pr_for_sha: Some(17),
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            pr_number: 0,
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        assert_eq!(gateway.created()[0].pr_number, 17);
    }

    #[tokio::test]
    async fn regression_missing_pr_association_stays_commit_scoped() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let opts = PostOptions {
            pr_number: 0,
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        let created = gateway.created();
        assert_eq!(created[0].pr_number, 0);
        assert_eq!(created[0].sha1, "abc");
    }

    #[tokio::test]
    async fn regression_post_without_org_or_target_is_rejected() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let error = controller
            .post(&PostOptions {
                org: String::new(),
                ..base_opts()
            })
            .await
            .expect_err("missing org");
        assert!(error.to_string().contains("organization is required"));
    }

    #[tokio::test]
    async fn functional_config_base_fills_unset_org_and_repo() {
        let config: Config = serde_yaml::from_str("base:\n  org: foo\n  repo: bar\n")
            .expect("config");
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), config);
        let opts = PostOptions {
            org: String::new(),
            repo: String::new(),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        let created = gateway.created();
        assert_eq!(created[0].org, "foo");
        assert_eq!(created[0].repo, "bar");
    }

    #[tokio::test]
    async fn functional_embedded_var_names_select_a_vars_subset() {
        let config: Config = serde_yaml::from_str(
            r#"
post:
  deploy:
    template: deployed
    embedded_var_names: [stage]
"#,
        )
        .expect("config");
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), config);
        let opts = PostOptions {
            template: String::new(),
            template_key: "deploy".to_string(),
            vars: BTreeMap::from([
                ("stage".to_string(), json!("prod")),
                ("secret".to_string(), json!("hidden")),
            ]),
            ..base_opts()
        };
        controller.post(&opts).await.expect("post");
        let meta = metadata::extract(&gateway.created()[0].body).expect("trailer");
        let vars = meta.get("Vars").expect("vars subset");
        assert_eq!(vars.get("stage"), Some(&json!("prod")));
        assert!(vars.get("secret").is_none());
    }
}
