//! `--var` / `--var-file` flag parsing.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::json;

/// Parse `name:value` vars and `name:path` var files into the template
/// variable map. File-backed entries win over inline ones of the same name.
pub fn parse_var_flags(
    vars: &[String],
    var_files: &[String],
) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut merged = BTreeMap::new();
    for raw in vars {
        let (name, value) = split_var(raw)?;
        merged.insert(name.to_string(), json!(value));
    }
    for raw in var_files {
        let (name, path) = split_var(raw)?;
        let value = std::fs::read_to_string(path)
            .with_context(|| format!("read the var file {path} for the variable {name}"))?;
        merged.insert(name.to_string(), json!(value));
    }
    Ok(merged)
}

fn split_var(raw: &str) -> Result<(&str, &str)> {
    raw.split_once(':')
        .with_context(|| format!("invalid variable `{raw}`: expected the form name:value"))
}
