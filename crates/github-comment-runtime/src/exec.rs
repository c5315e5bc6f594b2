//! The `exec` controller: run the wrapped command, pick the first matching
//! exec config, and dispatch the rendered result.
//!
//! The command's own exit code is the tool's exit code. Everything that
//! happens after the command ran (config resolution, rendering, posting) is
//! logged on failure but never overrides that code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use github_comment_core::condition;
use github_comment_core::config::{Config, ExecConfig};
use github_comment_core::domain::ExecResult;
use github_comment_core::platform::{Platform, TargetRef};
use github_comment_core::template;
use github_comment_github::CommentGateway;
use minijinja::value::Value;
use tracing::{error, info};

use crate::contexts::{exec_condition_context, ExecTemplateContext};
use crate::executor;
use crate::post::{
    append_trailer, build_link, merged_vars, metadata_trailer, send_with_update_scan,
    validate_target,
};
use crate::resolve::{complement_target, resolve_pr_number};
use crate::GetEnv;

/// Failure template used for the `default` key when the config file defines
/// no exec entry: post only when the command failed.
const DEFAULT_EXEC_WHEN: &str = "ExitCode != 0";
const DEFAULT_EXEC_TEMPLATE: &str = "\
{% include \"status\" %} {% include \"link\" %}

{% include \"join_command\" %}

{% include \"hidden_combined_output\" %}";
const DEFAULT_EXEC_TEMPLATE_FOR_TOO_LONG: &str = "\
{% include \"status\" %} {% include \"link\" %}

{% include \"join_command\" %}

The command output is omitted because the comment would be too long.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutput {
    /// Post to GitHub through the gateway (the default).
    Github,
    /// Append the rendered body to a local file, creating it when absent.
    File(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub org: String,
    pub repo: String,
    pub pr_number: u64,
    pub sha1: String,
    pub template_key: String,
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Empty means post to GitHub.
    pub outputs: Vec<ExecOutput>,
    /// Run the command and propagate its exit code without reporting.
    pub skip_comment: bool,
    /// The wrapped command and its arguments.
    pub args: Vec<String>,
}

pub struct ExecController {
    gateway: Arc<dyn CommentGateway>,
    config: Config,
    platform: Option<Platform>,
    getenv: GetEnv,
}

impl ExecController {
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

    /// Run the command and report its result. The returned exit code is
    /// always the wrapped command's.
    pub async fn exec(&self, opts: &ExecOptions) -> Result<i32> {
        let result = executor::run_command(&opts.args).await?;
        if opts.skip_comment {
            return Ok(result.exit_code);
        }
        if let Err(err) = self.report(opts, &result).await {
            error!("report the command result: {:#}", err);
        }
        Ok(result.exit_code)
    }

    async fn report(&self, opts: &ExecOptions, result: &ExecResult) -> Result<()> {
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

        let configs = self.resolve_exec_configs(&opts.template_key)?;
        let vars = merged_vars(&self.config.vars, &opts.vars);
        let ctx = exec_condition_context(result, &vars, &self.getenv);
        let Some(selected) = select_exec_config(&configs, &ctx)? else {
            info!(
                template_key = %opts.template_key,
                exit_code = result.exit_code,
                "no exec config matched; nothing to post"
            );
            return Ok(());
        };
        if selected.dont_comment {
            return Ok(());
        }

        let templates = template::merge_templates(
            &build_link(self.platform, &self.getenv),
            &self.config.templates,
        );
        let data = ExecTemplateContext {
            org: &target.org,
            repo: &target.repo,
            pr_number: target.pr_number,
            sha1: &target.sha1,
            template_key: &opts.template_key,
            exit_code: result.exit_code,
            command: &result.command,
            stdout: &result.stdout,
            stderr: &result.stderr,
            combined_output: &result.combined_output,
            vars: &vars,
        };
        let body = template::render(&selected.template, &templates, &data)
            .context("render the exec template")?;
        let body_for_too_long = match &selected.template_for_too_long {
            Some(tpl) => template::render(tpl, &templates, &data)
                .context("render the too-long fallback template")?,
            None => String::new(),
        };

        let trailer = metadata_trailer(
            &target,
            &opts.template_key,
            &selected.embedded_var_names,
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

        let default_outputs = [ExecOutput::Github];
        let outputs: &[ExecOutput] = if opts.outputs.is_empty() {
            &default_outputs
        } else {
            &opts.outputs
        };
        for output in outputs {
            let sent = match output {
                ExecOutput::Github => {
                    self.send_to_github(&target, selected, opts, &vars, &body, &body_for_too_long)
                        .await
                }
                ExecOutput::File(path) => append_to_file(path, &body).await,
            };
            if let Err(err) = sent {
                error!("dispatch the rendered comment: {:#}", err);
            }
        }
        Ok(())
    }

    async fn send_to_github(
        &self,
        target: &TargetRef,
        selected: &ExecConfig,
        opts: &ExecOptions,
        vars: &BTreeMap<String, serde_json::Value>,
        body: &str,
        body_for_too_long: &str,
    ) -> Result<()> {
        validate_target(target)?;
        send_with_update_scan(
            self.gateway.as_ref(),
            target,
            selected.update_condition.as_deref(),
            &opts.template_key,
            vars,
            body.to_string(),
            body_for_too_long.to_string(),
            &self.getenv,
        )
        .await
    }

    fn resolve_exec_configs(&self, template_key: &str) -> Result<Vec<ExecConfig>> {
        if let Some(configs) = self.config.exec.get(template_key) {
            return Ok(configs.clone());
        }
        if template_key == "default" {
            return Ok(default_exec_configs());
        }
        bail!("the exec config isn't found: {template_key}");
    }
}

fn default_exec_configs() -> Vec<ExecConfig> {
    vec![ExecConfig {
        when: DEFAULT_EXEC_WHEN.to_string(),
        template: DEFAULT_EXEC_TEMPLATE.to_string(),
        template_for_too_long: Some(DEFAULT_EXEC_TEMPLATE_FOR_TOO_LONG.to_string()),
        ..ExecConfig::default()
    }]
}

/// Walk the ordered configs and return the first whose `when` matches.
/// Later configs are not compiled or evaluated once a match is found.
fn select_exec_config<'a>(
    configs: &'a [ExecConfig],
    ctx: &Value,
) -> Result<Option<&'a ExecConfig>> {
    for config in configs {
        let program =
            condition::compile(&config.when).context("compile the when condition")?;
        if program
            .run(ctx)
            .context("evaluate the when condition")?
        {
            return Ok(Some(config));
        }
    }
    Ok(None)
}

async fn append_to_file(path: &Path, body: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("open the output file {}", path.display()))?;
    file.write_all(body.as_bytes())
        .await
        .with_context(|| format!("write the output file {}", path.display()))?;
    file.write_all(b"\n")
        .await
        .with_context(|| format!("write the output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use github_comment_core::config::Config;
    use github_comment_core::domain::ExecResult;
    use github_comment_core::metadata;

    use super::{select_exec_config, ExecController, ExecOptions, ExecOutput};
    use crate::contexts::exec_condition_context;
    use crate::test_support::MockGateway;
    use crate::GetEnv;

    fn no_env() -> GetEnv {
        Arc::new(|_: &str| String::new())
    }

    fn controller_with(gateway: Arc<MockGateway>, config: Config) -> ExecController {
        ExecController::new(gateway, config, None, no_env())
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn base_opts(script: &str) -> ExecOptions {
        ExecOptions {
            org: "foo".to_string(),
            repo: "bar".to_string(),
            pr_number: 3,
            sha1: "abc".to_string(),
            template_key: "default".to_string(),
            args: sh(script),
            ..ExecOptions::default()
        }
    }

    fn failed_config() -> Config {
        serde_yaml::from_str(
            r#"
exec:
  default:
    - when: ExitCode != 0
      template: failed
"#,
        )
        .expect("config")
    }

    #[tokio::test]
    async fn functional_exec_posts_when_the_first_config_matches() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), failed_config());
        let exit_code = controller
            .exec(&base_opts("exit 1"))
            .await
            .expect("exec");
        assert_eq!(exit_code, 1);
        let created = gateway.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].body.starts_with("failed\n"));
        assert!(metadata::extract(&created[0].body).is_some());
    }

    #[tokio::test]
    async fn functional_exec_posts_nothing_when_no_config_matches() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), failed_config());
        let exit_code = controller
            .exec(&base_opts("exit 0"))
            .await
            .expect("exec");
        assert_eq!(exit_code, 0);
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn functional_the_first_matching_config_wins_and_later_ones_are_ignored() {
        let config: Config = serde_yaml::from_str(
            r#"
exec:
  default:
    - when: "true"
      template: first
    - when: "this is ((( not a valid condition"
      template: second
"#,
        )
        .expect("config");
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), config);
        let exit_code = controller.exec(&base_opts("exit 0")).await.expect("exec");
        assert_eq!(exit_code, 0);
        let created = gateway.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].body.starts_with("first\n"));
    }

    #[tokio::test]
    async fn functional_dont_comment_suppresses_the_post() {
        let config: Config = serde_yaml::from_str(
            r#"
exec:
  default:
    - when: "true"
      dont_comment: true
    - when: "true"
      template: never rendered
"#,
        )
        .expect("config");
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), config);
        controller.exec(&base_opts("exit 0")).await.expect("exec");
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn functional_the_builtin_default_config_reports_failures_only() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        let exit_code = controller
            .exec(&base_opts("echo boom; exit 2"))
            .await
            .expect("exec");
        assert_eq!(exit_code, 2);
        let created = gateway.created();
        assert_eq!(created.len(), 1);
        assert!(created[0].body.contains(":x:"));
        assert!(created[0].body.contains("$ sh -c"));
        assert!(created[0].body.contains("boom"));
        assert!(!created[0].body_for_too_long.is_empty());

        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), Config::default());
        controller.exec(&base_opts("exit 0")).await.expect("exec");
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn functional_file_output_appends_across_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("result.md");
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), failed_config());
        let opts = ExecOptions {
            outputs: vec![ExecOutput::File(path.clone())],
            ..base_opts("exit 1")
        };
        controller.exec(&opts).await.expect("exec");
        controller.exec(&opts).await.expect("exec");
        let contents = std::fs::read_to_string(&path).expect("read output");
        assert_eq!(contents.matches("failed").count(), 2);
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn functional_skip_comment_runs_the_command_without_reporting() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), failed_config());
        let opts = ExecOptions {
            skip_comment: true,
            ..base_opts("exit 1")
        };
        let exit_code = controller.exec(&opts).await.expect("exec");
        assert_eq!(exit_code, 1);
        assert!(gateway.created().is_empty());
    }

    #[tokio::test]
    async fn regression_a_posting_failure_never_overrides_the_exit_code() {
        let gateway = Arc::new(MockGateway {
            create_fails: true,
            ..MockGateway::default()
        });
        let controller = controller_with(Arc::clone(&gateway), failed_config());
        let exit_code = controller
            .exec(&base_opts("exit 7"))
            .await
            .expect("exec");
        assert_eq!(exit_code, 7);
    }

    #[tokio::test]
    async fn regression_an_unknown_template_key_still_returns_the_exit_code() {
        let gateway = Arc::new(MockGateway::default());
        let controller = controller_with(Arc::clone(&gateway), failed_config());
        let opts = ExecOptions {
            template_key: "missing".to_string(),
            ..base_opts("exit 4")
        };
        let exit_code = controller.exec(&opts).await.expect("exec");
        assert_eq!(exit_code, 4);
        assert!(gateway.created().is_empty());
    }

    #[test]
    fn unit_select_exec_config_fails_on_a_malformed_reached_condition() {
        let configs = vec![github_comment_core::config::ExecConfig {
            when: "((".to_string(),
            ..github_comment_core::config::ExecConfig::default()
        }];
        let ctx = exec_condition_context(
            &ExecResult::default(),
            &std::collections::BTreeMap::new(),
            &no_env(),
        );
        let error = select_exec_config(&configs, &ctx).expect_err("compile failure");
        assert!(error.to_string().contains("compile the when condition"));
    }
}
