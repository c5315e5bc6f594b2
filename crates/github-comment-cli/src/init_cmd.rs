//! The `init` subcommand: write a commented starter configuration.

use std::path::Path;

use anyhow::{Context, Result};

const STARTER_CONFIG: &str = r##"---
# base:
#   org:
#   repo:
# vars:
#   foo: bar
#   zoo:
#     foo: hello
# templates:
#   header: "# {{ Org }}/{{ Repo }}"
# post:
#   default: |
#     {% include "header" %}
#     {{ Vars.foo }} {{ Vars.zoo.foo }}
#     {{ Org }} {{ Repo }} {{ PRNumber }} {{ SHA1 }} {{ TemplateKey }}
#   hello: hello
# exec:
#   hello:
#     - when: "true"
#       template: |
#         {% include "header" %}
#         exit code: {{ ExitCode }}
#
#         {% include "join_command" %}
#
#         Stdout:
#
#         {{ wrap_code(Stdout) }}
#
#         Stderr:
#
#         {{ wrap_code(Stderr) }}
# hide:
#   default: Comment.HasMeta and Comment.Meta.SHA1 != Commit.SHA1
"##;

/// Write `.github-comment.yml` into `dir` unless it already exists.
pub fn run_in(dir: &Path) -> Result<()> {
    let dst = dir.join(".github-comment.yml");
    if dst.exists() {
        return Ok(());
    }
    std::fs::write(&dst, STARTER_CONFIG)
        .with_context(|| format!("write the starter configuration {}", dst.display()))
}
