//! The github-comment binary: flag parsing, wiring, and dispatch.

mod bootstrap;
mod cli_args;
mod init_cmd;
mod vars;

use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use github_comment_core::config::Config;
use github_comment_core::platform::{getenv_os, Platform};
use github_comment_github::{
    CommentGateway, DryRunGateway, GithubClient, GithubClientParams,
};
use github_comment_runtime::{
    os_getenv, ExecController, ExecOptions, ExecOutput, HideController, HideOptions,
    PostController, PostOptions,
};
use tracing::info;

use crate::cli_args::{Cli, Command, CommonArgs, ExecArgs, HideArgs, PostArgs};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("github-comment: {error:#}");
            1
        }
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Post(args) => run_post(args).await.map(|()| 0),
        Command::Exec(args) => run_exec(args).await,
        Command::Hide(args) => run_hide(args).await.map(|()| 0),
        Command::Init(_) => {
            let wd = std::env::current_dir().context("get the working directory")?;
            init_cmd::run_in(&wd).map(|()| 0)
        }
    }
}

async fn run_post(args: PostArgs) -> Result<()> {
    bootstrap::init_tracing(&args.common.log_level);
    if skip_by_env()? {
        return Ok(());
    }
    let (config, gateway, platform) = wire(&args.common)?;
    let stdin_template = if args.stdin_template {
        Some(read_stdin()?)
    } else {
        None
    };
    let opts = PostOptions {
        org: args.common.org.clone().unwrap_or_default(),
        repo: args.common.repo.clone().unwrap_or_default(),
        pr_number: args.common.pr.unwrap_or(0),
        sha1: args.common.sha1.clone().unwrap_or_default(),
        template: args.template.unwrap_or_default(),
        template_key: args.template_key,
        stdin_template,
        update_condition: args.update_condition,
        vars: vars::parse_var_flags(&args.common.vars, &args.common.var_files)?,
    };
    let controller = PostController::new(gateway, config, platform, os_getenv());
    controller.post(&opts).await
}

async fn run_exec(args: ExecArgs) -> Result<i32> {
    bootstrap::init_tracing(&args.common.log_level);
    let (config, gateway, platform) = wire(&args.common)?;
    let opts = ExecOptions {
        org: args.common.org.clone().unwrap_or_default(),
        repo: args.common.repo.clone().unwrap_or_default(),
        pr_number: args.common.pr.unwrap_or(0),
        sha1: args.common.sha1.clone().unwrap_or_default(),
        template_key: args.template_key,
        vars: vars::parse_var_flags(&args.common.vars, &args.common.var_files)?,
        outputs: parse_outputs(&args.outs)?,
        skip_comment: skip_by_env()?,
        args: args.command,
    };
    let controller = ExecController::new(gateway, config, platform, os_getenv());
    controller.exec(&opts).await
}

async fn run_hide(args: HideArgs) -> Result<()> {
    bootstrap::init_tracing(&args.common.log_level);
    if skip_by_env()? {
        return Ok(());
    }
    let (config, gateway, platform) = wire(&args.common)?;
    let opts = HideOptions {
        org: args.common.org.clone().unwrap_or_default(),
        repo: args.common.repo.clone().unwrap_or_default(),
        pr_number: args.common.pr.unwrap_or(0),
        sha1: args.common.sha1.clone().unwrap_or_default(),
        condition: args.condition.unwrap_or_default(),
        hide_key: args.hide_key,
        vars: vars::parse_var_flags(&args.common.vars, &args.common.var_files)?,
    };
    let controller = HideController::new(gateway, config, platform, os_getenv());
    controller.hide(&opts).await
}

/// Load the config, build the gateway, and detect the CI platform.
fn wire(common: &CommonArgs) -> Result<(Config, Arc<dyn CommentGateway>, Option<Platform>)> {
    let wd = std::env::current_dir().context("get the working directory")?;
    let config = Config::find_and_load(common.config.as_deref(), &wd)
        .context("find and read the configuration file")?;
    let gateway = build_gateway(common, &config)?;
    let platform = Platform::detect(&getenv_os);
    Ok((config, gateway, platform))
}

fn build_gateway(common: &CommonArgs, config: &Config) -> Result<Arc<dyn CommentGateway>> {
    let silent = common.silent || config.silent;
    if common.dry_run {
        return Ok(Arc::new(DryRunGateway::new(silent)));
    }
    match resolve_token(common) {
        Some(token) => {
            let client = GithubClient::new(&GithubClientParams {
                token,
                ghe_base_url: config.ghe_base_url.clone(),
                ghe_graphql_endpoint: config.ghe_graphql_endpoint.clone(),
            })?;
            Ok(Arc::new(client))
        }
        None if common.skip_no_token || config.skip_no_token => {
            info!("no GitHub access token is set; working like --dry-run");
            Ok(Arc::new(DryRunGateway::new(silent)))
        }
        None => bail!(
            "the GitHub access token is required: pass --token or set GITHUB_TOKEN or GITHUB_ACCESS_TOKEN"
        ),
    }
}

fn resolve_token(common: &CommonArgs) -> Option<String> {
    common
        .token
        .clone()
        .filter(|token| !token.is_empty())
        .or_else(|| {
            std::env::var("GITHUB_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.is_empty())
        })
}

/// `GITHUB_COMMENT_SKIP=true` skips posting and hiding; exec still runs the
/// wrapped command and propagates its exit code.
fn skip_by_env() -> Result<bool> {
    let raw = std::env::var("GITHUB_COMMENT_SKIP").unwrap_or_default();
    if raw.is_empty() {
        return Ok(false);
    }
    parse_bool(&raw).with_context(|| {
        format!("parse the environment variable GITHUB_COMMENT_SKIP as a bool: {raw}")
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_outputs(outs: &[String]) -> Result<Vec<ExecOutput>> {
    outs.iter()
        .map(|raw| {
            if raw == "github" {
                Ok(ExecOutput::Github)
            } else if let Some(path) = raw.strip_prefix("file:") {
                Ok(ExecOutput::File(path.into()))
            } else {
                bail!("invalid --out value `{raw}`: expected `github` or `file:<path>`")
            }
        })
        .collect()
}

fn read_stdin() -> Result<String> {
    let mut template = String::new();
    std::io::stdin()
        .read_to_string(&mut template)
        .context("read the template from standard input")?;
    Ok(template)
}
