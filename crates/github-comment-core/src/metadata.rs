//! Embedded-metadata codec.
//!
//! Every templated body carries a single HTML-comment trailer line of the
//! shape `<!-- github-comment: {"SHA1":"...","TemplateKey":"..."} -->` so a
//! later run can re-identify comments this tool posted. The first
//! syntactically valid trailer line in a body is authoritative.

use std::collections::BTreeMap;

use serde_json::Value;

pub const METADATA_PREFIX: &str = "<!-- github-comment: ";
pub const METADATA_SUFFIX: &str = " -->";

/// Serialize `data` into an appendable trailer line.
pub fn embed(data: &BTreeMap<String, Value>) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(data)?;
    Ok(format!("{METADATA_PREFIX}{payload}{METADATA_SUFFIX}"))
}

/// Scan `body` for a trailer line and decode its JSON payload.
///
/// A line matches when it starts with the open sentinel and ends with the
/// close sentinel. Malformed JSON inside a matching line is skipped and
/// scanning continues; the first valid payload wins.
pub fn extract(body: &str) -> Option<BTreeMap<String, Value>> {
    for line in body.lines() {
        let Some(rest) = line.strip_prefix(METADATA_PREFIX) else {
            continue;
        };
        let Some(payload) = rest.strip_suffix(METADATA_SUFFIX) else {
            continue;
        };
        if let Ok(data) = serde_json::from_str::<BTreeMap<String, Value>>(payload) {
            return Some(data);
        }
    }
    None
}

/// Best-effort enrichment of `data` with job/workflow identifiers of the
/// detected CI platform. Unknown platform ids are a no-op.
pub fn set_ci_env(platform_id: &str, getenv: impl Fn(&str) -> String, data: &mut BTreeMap<String, Value>) {
    let mut put = |key: &str, name: &str| {
        data.insert(key.to_string(), Value::String(getenv(name)));
    };
    match platform_id {
        "circleci" => {
            put("job_name", "CIRCLE_JOB");
            put("job_id", "CIRCLE_WORKFLOW_JOB_ID");
        }
        "drone" => {
            put("workflow_name", "DRONE_STAGE_NAME");
            put("job_name", "DRONE_STEP_NAME");
        }
        "github-actions" => {
            put("workflow_name", "GITHUB_WORKFLOW");
            put("job_name", "GITHUB_JOB");
        }
        "codebuild" => {
            put("job_id", "CODEBUILD_BUILD_ID");
        }
        _ => {}
    }
}
