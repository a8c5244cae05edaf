use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dag::{RunContext, TaskId};

/// Malformed DAG request: rejected before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanError {
    #[error("specialist roster is empty")]
    EmptyRoster,

    #[error("specialist {0} appears more than once in the roster")]
    DuplicateSpecialist(String),

    #[error("invalid equipment: {0}")]
    InvalidEquipment(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("invalid goals: {0}")]
    InvalidGoals(String),

    #[error("task {0} already exists")]
    DuplicateTask(TaskId),

    #[error("task {0} not found")]
    UnknownTask(TaskId),

    #[error("task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: TaskId, to: TaskId },

    #[error("invalid deliberation group: {0}")]
    InvalidGroup(String),

    #[error("run {0} has no synthesized program to refine")]
    NoPriorProgram(String),

    #[error("invalid revision point: {0}")]
    InvalidRevisionPoint(String),
}

/// Fatal causes recorded against a run.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Error {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("deadlock: {unresolved:?} can never become ready")]
    Deadlock { unresolved: Vec<TaskId> },

    #[error("task {task_id} timed out after {timeout:?} ({attempts} attempts)")]
    TaskTimeout {
        task_id: TaskId,
        timeout: Duration,
        attempts: u32,
    },

    #[error("task {task_id} violated its output contract: {reason}")]
    TaskContract { task_id: TaskId, reason: String },

    #[error(
        "arbiter {arbiter}: only {available} of {roster} specialists succeeded (need {required})"
    )]
    InsufficientDeliberation {
        arbiter: TaskId,
        roster: usize,
        available: usize,
        required: usize,
    },

    #[error("task {task_id} failed after {attempts} attempts: {reason}")]
    TaskFailed {
        task_id: TaskId,
        reason: String,
        attempts: u32,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Task the error is attributed to, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Error::TaskTimeout { task_id, .. }
            | Error::TaskContract { task_id, .. }
            | Error::TaskFailed { task_id, .. } => Some(task_id),
            Error::InsufficientDeliberation { arbiter, .. } => Some(arbiter),
            Error::Plan(_) | Error::Deadlock { .. } | Error::Cancelled => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of an external evaluator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluatorError {
    #[error("transient evaluator failure: {0}")]
    Transient(String),

    #[error("evaluator rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("evaluator contract violation: {0}")]
    ContractViolation(String),

    /// The evaluator cannot run at all, e.g. its binary is missing
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
}

impl EvaluatorError {
    /// Rate limits are retried like any other transient failure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EvaluatorError::Transient(_) | EvaluatorError::RateLimited { .. }
        )
    }
}

/// A failed run: the first fatal cause plus the full context for diagnostics.
#[derive(Debug, Error)]
#[error("run {} failed: {cause}", .context.run_id())]
pub struct ExecutionError {
    pub cause: Error,
    pub context: Box<RunContext>,
}

impl ExecutionError {
    pub fn new(cause: Error, context: RunContext) -> Self {
        Self {
            cause,
            context: Box::new(context),
        }
    }

    /// Task named in the failure report, if the cause is attributable
    pub fn failing_task(&self) -> Option<&str> {
        self.cause.task_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(PlanError::EmptyRoster.to_string(), "specialist roster is empty");
        let err = Error::InsufficientDeliberation {
            arbiter: "gen-arbiter".to_string(),
            roster: 4,
            available: 0,
            required: 1,
        };
        assert_eq!(
            err.to_string(),
            "arbiter gen-arbiter: only 0 of 4 specialists succeeded (need 1)"
        );
        assert_eq!(err.task_id(), Some("gen-arbiter"));
    }

    #[test]
    fn test_plan_error_is_transparent() {
        let err: Error = PlanError::UnknownTask("x".to_string()).into();
        assert_eq!(err.to_string(), "task x not found");
        assert_eq!(err.task_id(), None);
    }

    #[test]
    fn test_evaluator_error_classes() {
        assert!(EvaluatorError::Transient("reset".into()).is_transient());
        assert!(EvaluatorError::RateLimited { retry_after: None }.is_transient());
        assert!(!EvaluatorError::ContractViolation("bad json".into()).is_transient());
        assert!(!EvaluatorError::Unavailable("claude not found".into()).is_transient());
    }
}
