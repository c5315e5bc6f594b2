//! Core decision logic shared by the github-comment binaries.
//!
//! Provides the comment/config data model, the condition evaluator and
//! template renderer, the embedded-metadata codec, and CI platform
//! detection consumed by the gateway and controller crates.

pub mod condition;
pub mod config;
pub mod domain;
pub mod metadata;
pub mod platform;
pub mod template;

pub use condition::{matches, Program};
pub use config::{Config, ExecConfig, PostConfig, DEFAULT_HIDE_CONDITION};
pub use domain::{Comment, ExecResult, IssueComment, PullRequestRef};
