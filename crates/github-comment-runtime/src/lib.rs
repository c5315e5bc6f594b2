//! Decision controllers and the external-process wrapper.
//!
//! Ties the core evaluator/renderer/codec and the comment gateway together
//! into the three one-shot operations: post, exec-then-post, and hide.

use std::sync::Arc;

mod contexts;
pub mod exec;
pub mod executor;
pub mod hide;
pub mod post;
mod resolve;
#[cfg(test)]
mod test_support;

/// Environment lookup handle threaded through controller construction so
/// tests can substitute a closure over a map.
pub type GetEnv = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The process environment as a [`GetEnv`].
pub fn os_getenv() -> GetEnv {
    Arc::new(|name: &str| std::env::var(name).unwrap_or_default())
}

pub use exec::{ExecController, ExecOptions, ExecOutput};
pub use executor::run_command;
pub use hide::{HideController, HideOptions};
pub use post::{PostController, PostOptions};
