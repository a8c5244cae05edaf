//! Run Context - per-run state for one generation request
//!
//! Owns the DAG, the results table keyed by task id, the error list and the
//! cancellation signal. Only the executor writes to it during a run; callers
//! may raise cancellation through a handle. After the run it is read-only and
//! can be archived as a `RunSnapshot`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::manager::{DagManager, DagState};
use super::payload::{RunInputs, TaskOutput};
use super::task::TaskId;
use crate::deliberation::{ArbiterInput, Arbitration};
use crate::error::{Error, PlanError};
use crate::model::FinalProgram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// An error recorded against the run, in the order encountered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub task_id: Option<TaskId>,
    pub phase: Option<usize>,
    pub error: Error,
    /// Absorbed by the degrade policy instead of failing the run
    pub recoverable: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    pub iteration: u32,
    pub parent_run: Option<String>,
    pub inputs: Arc<RunInputs>,
    pub dag: DagManager,
    /// Schedule computed once when the run starts
    pub phases: Vec<Vec<TaskId>>,
    pub results: BTreeMap<TaskId, TaskOutput>,
    pub errors: Vec<RunError>,
    /// Exactly what each arbiter was handed
    pub deliberations: BTreeMap<TaskId, ArbiterInput>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(dag: DagManager, inputs: RunInputs) -> Self {
        Self {
            run_id: format!("run-{}", short_id()),
            iteration: 0,
            parent_run: None,
            inputs: Arc::new(inputs),
            dag,
            phases: Vec::new(),
            results: BTreeMap::new(),
            errors: Vec::new(),
            deliberations: BTreeMap::new(),
            status: RunStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Mark this run as a refinement of `parent`
    pub fn with_parent(mut self, parent: impl Into<String>, iteration: u32) -> Self {
        self.parent_run = Some(parent.into());
        self.iteration = iteration;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Handle for raising cancellation from outside the executor
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn record_error(
        &mut self,
        task_id: Option<&str>,
        phase: Option<usize>,
        error: Error,
        recoverable: bool,
    ) {
        self.errors.push(RunError {
            task_id: task_id.map(str::to_string),
            phase,
            error,
            recoverable,
            at: Utc::now(),
        });
    }

    /// First error that was not absorbed by degradation
    pub fn first_fatal(&self) -> Option<&Error> {
        self.errors.iter().find(|e| !e.recoverable).map(|e| &e.error)
    }

    pub fn output(&self, task_id: &str) -> Option<&TaskOutput> {
        self.results.get(task_id)
    }

    pub fn phase_of(&self, task_id: &str) -> Option<usize> {
        self.phases
            .iter()
            .position(|phase| phase.iter().any(|id| id == task_id))
    }

    /// Output of the terminal task, if it succeeded
    pub fn program(&self) -> Option<&FinalProgram> {
        let terminal = self.dag.terminal()?;
        match self.results.get(&terminal.id)? {
            TaskOutput::Program(program) => Some(program),
            _ => None,
        }
    }

    pub fn arbitrations(&self) -> impl Iterator<Item = (&TaskId, &Arbitration)> {
        self.results.iter().filter_map(|(id, output)| match output {
            TaskOutput::Arbitration(a) => Some((id, a)),
            _ => None,
        })
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id.clone(),
            iteration: self.iteration,
            parent_run: self.parent_run.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            inputs: (*self.inputs).clone(),
            dag: self.dag.to_state(),
            phases: self.phases.clone(),
            results: self.results.clone(),
            errors: self.errors.clone(),
            deliberations: self.deliberations.clone(),
        }
    }

    /// Rehydrate an archived run for inspection or refinement
    pub fn from_snapshot(snapshot: RunSnapshot) -> Result<Self, PlanError> {
        Ok(Self {
            run_id: snapshot.run_id,
            iteration: snapshot.iteration,
            parent_run: snapshot.parent_run,
            inputs: Arc::new(snapshot.inputs),
            dag: DagManager::from_state(snapshot.dag)?,
            phases: snapshot.phases,
            results: snapshot.results,
            errors: snapshot.errors,
            deliberations: snapshot.deliberations,
            status: snapshot.status,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
            cancel: CancellationToken::new(),
        })
    }
}

/// Serializable, read-only image of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub iteration: u32,
    pub parent_run: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub inputs: RunInputs,
    pub dag: DagState,
    pub phases: Vec<Vec<TaskId>>,
    pub results: BTreeMap<TaskId, TaskOutput>,
    pub errors: Vec<RunError>,
    #[serde(default)]
    pub deliberations: BTreeMap<TaskId, ArbiterInput>,
}

impl RunSnapshot {
    pub fn program(&self) -> Option<&FinalProgram> {
        self.results.values().find_map(|o| match o {
            TaskOutput::Program(p) => Some(p),
            _ => None,
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
