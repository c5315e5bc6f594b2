//! Boolean condition evaluation for `when`, `update`, and hide conditions.
//!
//! Conditions are minijinja expressions evaluated against a serialized
//! context (`ExitCode != 0`, `Comment.HasMeta and Comment.Meta.SHA1 !=
//! Commit.SHA1`, ...). A result that is not a boolean counts as "no match"
//! rather than an error; only compilation failures are fatal to the caller.

use minijinja::value::ValueKind;
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use thiserror::Error;

fn condition_environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    // Dotted lookups over absent metadata (`Comment.Meta.SHA1` on a comment
    // without a trailer) must yield undefined, not a hard error.
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("compile the condition `{expression}`: {source}")]
    Compile {
        expression: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("evaluate the condition `{expression}`: {source}")]
    Evaluate {
        expression: String,
        #[source]
        source: minijinja::Error,
    },
}

/// A validated condition expression.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
}

/// Validate and compile a condition expression.
pub fn compile(expression: &str) -> Result<Program, ConditionError> {
    let env = condition_environment();
    env.compile_expression(expression)
        .map_err(|source| ConditionError::Compile {
            expression: expression.to_string(),
            source,
        })?;
    Ok(Program {
        source: expression.to_string(),
    })
}

impl Program {
    /// Evaluate the condition against `context`. Non-boolean results are
    /// treated as false.
    pub fn run(&self, context: impl Serialize) -> Result<bool, ConditionError> {
        let env = condition_environment();
        let expr =
            env.compile_expression(&self.source)
                .map_err(|source| ConditionError::Compile {
                    expression: self.source.clone(),
                    source,
                })?;
        let value = expr
            .eval(context)
            .map_err(|source| ConditionError::Evaluate {
                expression: self.source.clone(),
                source,
            })?;
        Ok(value.kind() == ValueKind::Bool && value.is_true())
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Compile-and-run convenience with the same error semantics as
/// [`compile`] + [`Program::run`].
pub fn matches(expression: &str, context: impl Serialize) -> Result<bool, ConditionError> {
    compile(expression)?.run(context)
}
