//! External evaluators: the opaque asynchronous calls behind external-call tasks.

mod prompts;
mod rules;
mod runner;

use async_trait::async_trait;

use crate::dag::{TaskInput, TaskOutput};
use crate::error::EvaluatorError;

pub use rules::RuleEvaluator;
pub use runner::{ClaudeEvaluator, CliOptions, CliOutput, CliRunner, Model};

/// One call per attempt; the executor owns timeout, retry and ordering
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn invoke(&self, input: &TaskInput) -> Result<TaskOutput, EvaluatorError>;
}
