//! Configuration file model and discovery.
//!
//! The config file is YAML, discovered by walking up from the working
//! directory (`github-comment.yaml`, `github-comment.yml`,
//! `.github-comment.yml`, `.github-comment.yaml`). A missing file yields the
//! built-in defaults; an unreadable or undecodable file is an error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Hide condition registered under the `default` key unless the config file
/// overrides it: drop comments whose embedded commit differs from the one
/// being reported on.
pub const DEFAULT_HIDE_CONDITION: &str =
    "Comment.HasMeta and Comment.Meta.SHA1 != Commit.SHA1";

const CONFIG_FILE_NAMES: [&str; 4] = [
    "github-comment.yaml",
    "github-comment.yml",
    ".github-comment.yml",
    ".github-comment.yaml",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read the configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decode the configuration file {path} as YAML: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub base: Option<BaseConfig>,
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Named templates available to every body via `{% include %}`.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub post: BTreeMap<String, PostConfig>,
    /// Ordered per key; the first entry whose `when` matches wins.
    #[serde(default)]
    pub exec: BTreeMap<String, Vec<ExecConfig>>,
    #[serde(default)]
    pub hide: BTreeMap<String, String>,
    #[serde(default)]
    pub skip_no_token: bool,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub ghe_base_url: Option<String>,
    #[serde(default)]
    pub ghe_graphql_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub repo: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawPostConfig")]
pub struct PostConfig {
    pub template: String,
    pub template_for_too_long: Option<String>,
    pub embedded_var_names: Vec<String>,
    pub update_condition: Option<String>,
}

/// `post` entries accept a bare string as shorthand for `{template: ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPostConfig {
    Shorthand(String),
    Table {
        template: String,
        #[serde(default)]
        template_for_too_long: Option<String>,
        #[serde(default)]
        embedded_var_names: Vec<String>,
        #[serde(default)]
        update: Option<String>,
    },
}

impl From<RawPostConfig> for PostConfig {
    fn from(raw: RawPostConfig) -> Self {
        match raw {
            RawPostConfig::Shorthand(template) => PostConfig {
                template,
                ..PostConfig::default()
            },
            RawPostConfig::Table {
                template,
                template_for_too_long,
                embedded_var_names,
                update,
            } => PostConfig {
                template,
                template_for_too_long,
                embedded_var_names,
                update_condition: update,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecConfig {
    #[serde(default, deserialize_with = "string_or_bool")]
    pub when: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub template_for_too_long: Option<String>,
    #[serde(default)]
    pub dont_comment: bool,
    #[serde(default)]
    pub embedded_var_names: Vec<String>,
    #[serde(default, rename = "update")]
    pub update_condition: Option<String>,
}

/// `when: true` is a natural thing to write in YAML; accept the bare bool.
fn string_or_bool<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrBool {
        Bool(bool),
        String(String),
    }
    Ok(match StringOrBool::deserialize(deserializer)? {
        StringOrBool::Bool(value) => value.to_string(),
        StringOrBool::String(value) => value,
    })
}

impl Config {
    /// Load the config from `explicit` when given, otherwise walk up from
    /// `wd` looking for a config file. A missing file yields the defaults.
    pub fn find_and_load(explicit: Option<&Path>, wd: &Path) -> Result<Config, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(wd),
        };
        let mut config = match path {
            Some(path) => Config::load(&path)?,
            None => Config::default(),
        };
        config
            .hide
            .entry("default".to_string())
            .or_insert_with(|| DEFAULT_HIDE_CONDITION.to_string());
        Ok(config)
    }

    fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn find_config_file(wd: &Path) -> Option<PathBuf> {
    let mut dir = Some(wd);
    while let Some(current) = dir {
        for name in CONFIG_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        dir = current.parent();
    }
    None
}
