//! Comment body rendering.
//!
//! Bodies are minijinja templates. Config `templates` entries and a small
//! built-in set are registered as named templates that the primary template
//! pulls in with `{% include %}`. Helper functions are deliberately limited:
//! template content is frequently derived from pull-request-supplied data,
//! so nothing that reads process environment variables or resolves hosts is
//! exposed to the engine.

use std::collections::BTreeMap;

use minijinja::value::Value;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;

/// Name under which the primary template is registered.
const MAIN_TEMPLATE: &str = "comment";

/// Bodies longer than this are truncated by `wrap_code` before fencing.
const WRAP_CODE_MAX_LEN: usize = 60_000;
/// Length of the head and tail kept by the truncation.
const WRAP_CODE_KEEP_LEN: usize = 20_000;

const TRUNCATION_MARKER: &str = "\n\n# ...\n# ... The maximum length of a GitHub comment is 65536 characters, so github-comment omitted the middle of the content.\n# ...\n\n";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("parse the template `{name}`: {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("render the template: {source}")]
    Render {
        #[source]
        source: minijinja::Error,
    },
}

/// Render `template` with `partials` registered as named includes.
///
/// Rendering is deterministic: identical `(template, partials, data)` always
/// produce identical output.
pub fn render(
    template: &str,
    partials: &BTreeMap<String, String>,
    data: impl Serialize,
) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    register_helpers(&mut env);
    for (name, source) in partials {
        env.add_template(name, source)
            .map_err(|source| TemplateError::Parse {
                name: name.clone(),
                source,
            })?;
    }
    env.add_template(MAIN_TEMPLATE, template)
        .map_err(|source| TemplateError::Parse {
            name: MAIN_TEMPLATE.to_string(),
            source,
        })?;
    let tmpl = env
        .get_template(MAIN_TEMPLATE)
        .map_err(|source| TemplateError::Parse {
            name: MAIN_TEMPLATE.to_string(),
            source,
        })?;
    tmpl.render(data)
        .map_err(|source| TemplateError::Render { source })
}

/// Built-in templates, overridable by config `templates` entries.
///
/// `link` renders the CI build link of the detected platform and is empty
/// when no platform was detected.
pub fn builtin_templates(build_link: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("link".to_string(), build_link.to_string()),
        (
            "status".to_string(),
            r#":{{ "white_check_mark" if ExitCode == 0 else "x" }}:"#.to_string(),
        ),
        (
            "join_command".to_string(),
            "```\n$ {{ Command }}\n```".to_string(),
        ),
        (
            "hidden_combined_output".to_string(),
            "<details>\n\n{{ wrap_code(CombinedOutput) }}\n\n</details>".to_string(),
        ),
    ])
}

/// Merge built-in templates with user-defined ones; user entries win.
pub fn merge_templates(
    build_link: &str,
    user_templates: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = builtin_templates(build_link);
    for (name, source) in user_templates {
        merged.insert(name.clone(), source.clone());
    }
    merged
}

fn register_helpers(env: &mut Environment) {
    env.add_function("wrap_code", wrap_code);
    env.add_function("avoid_html_escape", avoid_html_escape);
    env.add_function("status_icon", status_icon);
}

fn status_icon(exit_code: i64) -> String {
    if exit_code == 0 {
        ":white_check_mark:".to_string()
    } else {
        ":x:".to_string()
    }
}

/// Wrap command output in a code block.
///
/// Output above [`WRAP_CODE_MAX_LEN`] keeps the head and tail with an elision
/// marker in between. Content that itself contains a triple backtick cannot
/// be fenced, so it is HTML-escaped into `<pre><code>` instead.
fn wrap_code(text: String) -> Value {
    let text = truncate_middle(&text);
    if text.contains("```") {
        Value::from_safe_string(format!("<pre><code>{}</code></pre>", escape_html(&text)))
    } else {
        Value::from_safe_string(format!("\n```\n{text}\n```\n"))
    }
}

/// Raw passthrough for controlled unescaped output.
fn avoid_html_escape(text: String) -> Value {
    Value::from_safe_string(text)
}

fn truncate_middle(text: &str) -> String {
    if text.len() <= WRAP_CODE_MAX_LEN {
        return text.to_string();
    }
    let head_end = floor_char_boundary(text, WRAP_CODE_KEEP_LEN);
    let tail_start = ceil_char_boundary(text, text.len() - WRAP_CODE_KEEP_LEN);
    format!(
        "{}{TRUNCATION_MARKER}{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
