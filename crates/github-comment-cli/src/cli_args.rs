use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "github-comment",
    about = "Post, update, and hide GitHub comments from CI",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Post a comment to a pull request, issue, or commit.
    Post(PostArgs),
    /// Run a command and post a comment based on its result.
    Exec(ExecArgs),
    /// Minimize outdated comments.
    Hide(HideArgs),
    /// Write a starter configuration file.
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    #[arg(long, help = "GitHub organization name")]
    pub org: Option<String>,

    #[arg(long, help = "GitHub repository name")]
    pub repo: Option<String>,

    #[arg(
        long,
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub API token; GITHUB_ACCESS_TOKEN is also honored"
    )]
    pub token: Option<String>,

    #[arg(long, help = "Commit SHA1")]
    pub sha1: Option<String>,

    #[arg(long, help = "Pull request or issue number")]
    pub pr: Option<u64>,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long = "var",
        value_name = "NAME:VALUE",
        help = "Template variable; repeatable"
    )]
    pub vars: Vec<String>,

    #[arg(
        long = "var-file",
        value_name = "NAME:PATH",
        help = "Template variable whose value is read from a file; repeatable"
    )]
    pub var_files: Vec<String>,

    #[arg(
        long,
        help = "Output the comment to standard error output instead of posting it"
    )]
    pub dry_run: bool,

    #[arg(
        long,
        short = 'n',
        env = "GITHUB_COMMENT_SKIP_NO_TOKEN",
        help = "Work like --dry-run when no GitHub access token is set"
    )]
    pub skip_no_token: bool,

    #[arg(long, short = 's', help = "Suppress the dry-run body echo")]
    pub silent: bool,

    #[arg(
        long = "log-level",
        default_value = "warn",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,
}

#[derive(Debug, Args)]
pub struct PostArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, help = "Comment template; wins over the config entry")]
    pub template: Option<String>,

    #[arg(
        long = "template-key",
        short = 'k',
        default_value = "default",
        help = "Key of the config post entry to render"
    )]
    pub template_key: String,

    #[arg(
        long = "stdin-template",
        help = "Read the comment template from standard input"
    )]
    pub stdin_template: bool,

    #[arg(
        long = "update-condition",
        short = 'u',
        help = "Edit the existing comment matching this condition instead of creating one"
    )]
    pub update_condition: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(
        long = "template-key",
        short = 'k',
        default_value = "default",
        help = "Key of the config exec entry to evaluate"
    )]
    pub template_key: String,

    #[arg(
        long = "out",
        value_name = "DEST",
        help = "Output destination: `github` or `file:<path>`; repeatable"
    )]
    pub outs: Vec<String>,

    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true,
        value_name = "COMMAND",
        help = "The command to run and its arguments"
    )]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HideArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, help = "Hide condition; wins over --hide-key")]
    pub condition: Option<String>,

    #[arg(
        long = "hide-key",
        default_value = "default",
        help = "Key of the config hide entry to evaluate"
    )]
    pub hide_key: String,
}

#[derive(Debug, Args)]
pub struct InitArgs {}
