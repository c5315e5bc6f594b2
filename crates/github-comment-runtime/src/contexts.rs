//! Context builders for condition evaluation and template rendering.
//!
//! Template contexts are plain serializable structs and never expose an
//! environment accessor: template text is frequently derived from
//! pull-request-supplied content. Condition contexts additionally carry the
//! `Env(name)` escape hatch, since conditions only ever come from flags or
//! the config file.

use std::collections::BTreeMap;

use github_comment_core::domain::{ExecResult, IssueComment};
use github_comment_core::metadata;
use github_comment_core::platform::TargetRef;
use minijinja::context;
use minijinja::value::Value;
use serde::Serialize;

use crate::GetEnv;

/// Data exposed to `post` templates.
#[derive(Serialize)]
pub(crate) struct PostTemplateContext<'a> {
    #[serde(rename = "Org")]
    pub org: &'a str,
    #[serde(rename = "Repo")]
    pub repo: &'a str,
    #[serde(rename = "PRNumber")]
    pub pr_number: u64,
    #[serde(rename = "SHA1")]
    pub sha1: &'a str,
    #[serde(rename = "TemplateKey")]
    pub template_key: &'a str,
    #[serde(rename = "Vars")]
    pub vars: &'a BTreeMap<String, serde_json::Value>,
}

/// Data exposed to `exec` templates: the post fields plus the command result.
#[derive(Serialize)]
pub(crate) struct ExecTemplateContext<'a> {
    #[serde(rename = "Org")]
    pub org: &'a str,
    #[serde(rename = "Repo")]
    pub repo: &'a str,
    #[serde(rename = "PRNumber")]
    pub pr_number: u64,
    #[serde(rename = "SHA1")]
    pub sha1: &'a str,
    #[serde(rename = "TemplateKey")]
    pub template_key: &'a str,
    #[serde(rename = "ExitCode")]
    pub exit_code: i32,
    #[serde(rename = "Command")]
    pub command: &'a str,
    #[serde(rename = "Stdout")]
    pub stdout: &'a str,
    #[serde(rename = "Stderr")]
    pub stderr: &'a str,
    #[serde(rename = "CombinedOutput")]
    pub combined_output: &'a str,
    #[serde(rename = "Vars")]
    pub vars: &'a BTreeMap<String, serde_json::Value>,
}

fn env_function(getenv: &GetEnv) -> Value {
    let getenv = GetEnv::clone(getenv);
    Value::from_function(move |name: String| getenv(&name))
}

/// Context for an `exec` config `when` condition.
pub(crate) fn exec_condition_context(
    result: &ExecResult,
    vars: &BTreeMap<String, serde_json::Value>,
    getenv: &GetEnv,
) -> Value {
    context! {
        ExitCode => result.exit_code,
        Command => result.command.as_str(),
        Stdout => result.stdout.as_str(),
        Stderr => result.stderr.as_str(),
        CombinedOutput => result.combined_output.as_str(),
        Vars => Value::from_serialize(vars),
        Env => env_function(getenv),
    }
}

/// Context for scanning an existing comment: the hide condition and the
/// update condition both see the same shape. `hide_key` is present only in
/// the hide scan.
pub(crate) fn comment_scan_context(
    comment: &IssueComment,
    target: &TargetRef,
    vars: &BTreeMap<String, serde_json::Value>,
    hide_key: Option<&str>,
    getenv: &GetEnv,
) -> Value {
    let meta = metadata::extract(&comment.body);
    let has_meta = meta.is_some();
    let meta = meta.unwrap_or_default();
    context! {
        Comment => context! {
            Body => comment.body.as_str(),
            Meta => Value::from_serialize(&meta),
            HasMeta => has_meta,
        },
        Commit => context! {
            Org => target.org.as_str(),
            Repo => target.repo.as_str(),
            PRNumber => target.pr_number,
            SHA1 => target.sha1.as_str(),
        },
        HideKey => hide_key.unwrap_or_default(),
        Vars => Value::from_serialize(vars),
        Env => env_function(getenv),
    }
}
