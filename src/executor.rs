//! Phase-barrier executor.
//!
//! Walks the phases computed once at run start. Tasks inside a phase run
//! concurrently (external calls bounded by a semaphore, each under its own
//! timeout and retry budget); the next phase is not dispatched until every
//! task of the current one is terminal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::Evaluator;
use crate::dag::{
    AttemptRecord, DagManager, RunContext, RunInputs, RunStatus, TaskId, TaskInput, TaskKind,
    TaskOutput, TaskRole, TaskStatus,
};
use crate::deliberation::{Arbiter, ArbiterInput, SpecialistEntry};
use crate::error::{Error, EvaluatorError, ExecutionError, PlanError};
use crate::stages;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Retries after the first attempt, for transient failures only
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Per attempt, independent of the phase's duration
    pub task_timeout: Duration,
    /// Ceiling on concurrent external calls within a phase
    pub phase_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            task_timeout: Duration::from_secs(180),
            phase_concurrency: 4,
        }
    }
}

impl ExecutorConfig {
    /// Exponential delay before attempt `attempt + 1`
    pub fn backoff(&self, attempt: u32, error: Option<&EvaluatorError>) -> Duration {
        if let Some(EvaluatorError::RateLimited {
            retry_after: Some(after),
        }) = error
        {
            return (*after).min(self.max_backoff);
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Progress events, emitted in order for one run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: String,
        phases: usize,
        tasks: usize,
    },
    PhaseStarted {
        phase: usize,
        tasks: Vec<TaskId>,
    },
    TaskDispatched {
        phase: usize,
        task_id: TaskId,
        attempt: u32,
    },
    TaskRetrying {
        task_id: TaskId,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    TaskFinished {
        phase: usize,
        task_id: TaskId,
        status: TaskStatus,
    },
    PhaseCompleted {
        phase: usize,
        succeeded: usize,
        failed: usize,
    },
    RunCancelled {
        phase: usize,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
    },
}

pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// What admission decided for a task about to enter its phase
enum Admission {
    Dispatch(TaskInput),
    Skip(String),
    Fail(Error),
}

/// How an external call ended
enum CallOutcome {
    /// Cancelled before a permit was granted; the task never started
    NotStarted,
    /// Cancelled while in flight; any late result is dropped
    Abandoned {
        started_at: DateTime<Utc>,
        attempts: Vec<AttemptRecord>,
    },
    Finished {
        started_at: DateTime<Utc>,
        attempts: Vec<AttemptRecord>,
        result: Result<TaskOutput, Error>,
    },
}

pub struct Executor {
    evaluator: Arc<dyn Evaluator>,
    arbiter: Arbiter,
    config: ExecutorConfig,
    observer: Option<Arc<dyn RunObserver>>,
}

impl Executor {
    pub fn new(evaluator: Arc<dyn Evaluator>, arbiter: Arbiter, config: ExecutorConfig) -> Self {
        Self {
            evaluator,
            arbiter,
            config,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    /// Build a fresh context for `dag` and execute it
    pub async fn run(
        &self,
        dag: DagManager,
        inputs: RunInputs,
    ) -> Result<RunContext, ExecutionError> {
        self.execute(RunContext::new(dag, inputs)).await
    }

    /// Execute every phase of the context's DAG
    ///
    /// Succeeds only when the terminal task succeeds; otherwise returns the
    /// first fatal cause together with the full context.
    pub async fn execute(&self, mut ctx: RunContext) -> Result<RunContext, ExecutionError> {
        let phases = match ctx.dag.phases() {
            Ok(phases) => phases,
            Err(e) => {
                ctx.record_error(None, None, e.clone(), false);
                ctx.status = RunStatus::Failed;
                ctx.completed_at = Some(Utc::now());
                return Err(ExecutionError::new(e, ctx));
            }
        };
        ctx.phases = phases.clone();
        ctx.status = RunStatus::Running;

        info!(
            run_id = ctx.run_id(),
            phases = phases.len(),
            tasks = ctx.dag.len(),
            "Run started"
        );
        self.emit(ExecutionEvent::RunStarted {
            run_id: ctx.run_id().to_string(),
            phases: phases.len(),
            tasks: ctx.dag.len(),
        });

        let cancel = ctx.cancel_handle();
        let mut cancelled = false;

        for (phase, ids) in phases.iter().enumerate() {
            if cancel.is_cancelled() {
                self.record_cancel(&mut ctx, phase);
                cancelled = true;
                break;
            }

            self.emit(ExecutionEvent::PhaseStarted {
                phase,
                tasks: ids.clone(),
            });
            debug!(phase, tasks = ?ids, "Phase started");

            if !self.run_phase(&mut ctx, phase, ids, &cancel).await {
                self.record_cancel(&mut ctx, phase);
                cancelled = true;
                break;
            }

            let (succeeded, failed) = ids.iter().fold((0, 0), |(ok, bad), id| {
                match ctx.dag.get_task(id).map(|t| &t.status) {
                    Some(TaskStatus::Succeeded) => (ok + 1, bad),
                    Some(_) => (ok, bad + 1),
                    None => (ok, bad),
                }
            });
            info!(phase, succeeded, failed, "Phase completed");
            self.emit(ExecutionEvent::PhaseCompleted {
                phase,
                succeeded,
                failed,
            });
        }

        self.conclude(ctx, cancelled)
    }

    /// Run one phase to its barrier; false if cancellation interrupted it
    async fn run_phase(
        &self,
        ctx: &mut RunContext,
        phase: usize,
        ids: &[TaskId],
        cancel: &CancellationToken,
    ) -> bool {
        let mut local = Vec::new();
        let mut external = Vec::new();

        for id in ids {
            match self.admit(ctx, id) {
                Admission::Dispatch(input) => {
                    if let Some(task) = ctx.dag.get_task_mut(id) {
                        task.mark_ready();
                    }
                    match input.role.kind() {
                        TaskKind::LocalCompute => local.push(input),
                        TaskKind::ExternalCall => external.push(input),
                    }
                }
                Admission::Skip(reason) => {
                    debug!(task_id = %id, %reason, "Skipping task");
                    if let Some(task) = ctx.dag.get_task_mut(id) {
                        task.skip(reason);
                    }
                    self.finished(ctx, phase, id);
                }
                Admission::Fail(error) => {
                    warn!(task_id = %id, %error, "Task failed at admission");
                    if let Some(task) = ctx.dag.get_task_mut(id) {
                        task.fail(error.to_string());
                    }
                    ctx.record_error(Some(id), Some(phase), error, false);
                    self.finished(ctx, phase, id);
                }
            }
        }

        // Local computes: inline, no suspension
        for (index, input) in local.iter().enumerate() {
            if cancel.is_cancelled() {
                let undispatched = local[index..].iter().chain(external.iter());
                for input in undispatched {
                    if let Some(task) = ctx.dag.get_task_mut(&input.task_id) {
                        task.unqueue();
                    }
                }
                return false;
            }
            let id = input.task_id.clone();
            if let Some(task) = ctx.dag.get_task_mut(&id) {
                task.start();
            }
            self.emit(ExecutionEvent::TaskDispatched {
                phase,
                task_id: id.clone(),
                attempt: 1,
            });
            let result = stages::run_local(&self.arbiter, input).and_then(|output| {
                stages::check_contract(input, &output)
                    .map(|_| output)
                    .map_err(|reason| Error::TaskContract {
                        task_id: id.clone(),
                        reason,
                    })
            });
            self.record_result(ctx, phase, &input.role, &id, result);
        }

        if external.is_empty() {
            return !cancel.is_cancelled();
        }

        // External calls: concurrent, joined at the barrier
        let semaphore = Semaphore::new(self.config.phase_concurrency.max(1));
        let calls = external
            .iter()
            .map(|input| self.call_external(phase, input.clone(), &semaphore, cancel));
        let outcomes = join_all(calls).await;

        let mut interrupted = false;
        for (input, outcome) in external.iter().zip(outcomes) {
            let id = &input.task_id;
            match outcome {
                CallOutcome::NotStarted => {
                    interrupted = true;
                    if let Some(task) = ctx.dag.get_task_mut(id) {
                        task.unqueue();
                    }
                }
                CallOutcome::Abandoned {
                    started_at,
                    attempts,
                } => {
                    interrupted = true;
                    if let Some(task) = ctx.dag.get_task_mut(id) {
                        task.started_at = Some(started_at);
                        task.record_attempts(attempts);
                        task.skip("run cancelled");
                    }
                }
                CallOutcome::Finished {
                    started_at,
                    attempts,
                    result,
                } => {
                    if let Some(task) = ctx.dag.get_task_mut(id) {
                        task.started_at = Some(started_at);
                        task.record_attempts(attempts);
                    }
                    self.record_result(ctx, phase, &input.role, id, result);
                }
            }
        }

        !interrupted
    }

    /// Decide whether a task can run, and assemble its input
    fn admit(&self, ctx: &mut RunContext, id: &str) -> Admission {
        let Some(task) = ctx.dag.get_task(id) else {
            return Admission::Fail(PlanError::UnknownTask(id.to_string()).into());
        };
        let role = task.role;

        if role == TaskRole::Arbiter {
            if let Some(group) = ctx.dag.group_for_arbiter(id).cloned() {
                return self.admit_arbiter(ctx, id, &group.seed, &group.specialists);
            }
        }

        let deps = ctx.dag.dependencies(id);
        for dep in &deps {
            let status = ctx.dag.get_task(dep).map(|t| t.status.clone());
            if status != Some(TaskStatus::Succeeded) {
                let label = status.as_ref().map(|s| s.label()).unwrap_or("missing");
                return Admission::Skip(format!("dependency {} {}", dep, label));
            }
        }

        let upstream = deps
            .iter()
            .filter_map(|dep| ctx.results.get(dep).map(|o| (dep.clone(), o.clone())))
            .collect();

        Admission::Dispatch(TaskInput {
            task_id: id.to_string(),
            role,
            attempt: 1,
            run: ctx.inputs.clone(),
            upstream,
            deliberation: None,
        })
    }

    /// Arbiter admission: one entry per roster slot, in roster order
    fn admit_arbiter(
        &self,
        ctx: &mut RunContext,
        id: &str,
        seed: &str,
        specialists: &[TaskId],
    ) -> Admission {
        let draft = match ctx.results.get(seed) {
            Some(TaskOutput::Draft(draft)) => draft.clone(),
            _ => return Admission::Skip(format!("dependency {} did not produce a draft", seed)),
        };

        let mut entries = Vec::with_capacity(specialists.len());
        for specialist_id in specialists {
            let Some(task) = ctx.dag.get_task(specialist_id) else {
                continue;
            };
            let (position, kind) = match task.role {
                TaskRole::Specialist { kind, position } => (position, kind),
                _ => continue,
            };
            let entry = match (&task.status, ctx.results.get(specialist_id)) {
                (TaskStatus::Succeeded, Some(TaskOutput::Opinion(opinion))) => {
                    SpecialistEntry::Available {
                        position,
                        kind,
                        opinion: opinion.clone(),
                    }
                }
                (status, _) => SpecialistEntry::Unavailable {
                    position,
                    kind,
                    reason: status
                        .reason()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("specialist {}", status.label())),
                },
            };
            entries.push(entry);
        }

        let deliberation = ArbiterInput { draft, entries };
        let available = deliberation.available();
        let roster = deliberation.entries.len();
        ctx.deliberations
            .insert(id.to_string(), deliberation.clone());

        if available < self.arbiter.min_quorum() {
            return Admission::Fail(Error::InsufficientDeliberation {
                arbiter: id.to_string(),
                roster,
                available,
                required: self.arbiter.min_quorum(),
            });
        }
        if available < roster {
            warn!(
                arbiter = id,
                available, roster, "Deliberating with unavailable specialists"
            );
        }

        let upstream: BTreeMap<TaskId, TaskOutput> = specialists
            .iter()
            .filter_map(|s| ctx.results.get(s).map(|o| (s.clone(), o.clone())))
            .collect();

        Admission::Dispatch(TaskInput {
            task_id: id.to_string(),
            role: TaskRole::Arbiter,
            attempt: 1,
            run: ctx.inputs.clone(),
            upstream,
            deliberation: Some(deliberation),
        })
    }

    /// One external task: permit, then attempts under timeout, retry and cancellation
    async fn call_external(
        &self,
        phase: usize,
        mut input: TaskInput,
        semaphore: &Semaphore,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CallOutcome::NotStarted,
            permit = semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return CallOutcome::NotStarted,
            },
        };

        let started_at = Utc::now();
        let max_attempts = self.config.max_retries.saturating_add(1);
        let timeout = self.config.task_timeout;
        let mut attempts = Vec::new();

        for attempt in 1..=max_attempts {
            input.attempt = attempt;
            self.emit(ExecutionEvent::TaskDispatched {
                phase,
                task_id: input.task_id.clone(),
                attempt,
            });
            debug!(task_id = %input.task_id, attempt, "Dispatching");

            let attempt_start = Utc::now();
            let clock = Instant::now();
            let call = tokio::time::timeout(timeout, self.evaluator.invoke(&input));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    attempts.push(AttemptRecord {
                        attempt,
                        started_at: attempt_start,
                        duration_ms: clock.elapsed().as_millis() as u64,
                        error: Some("abandoned: run cancelled".to_string()),
                    });
                    return CallOutcome::Abandoned { started_at, attempts };
                }
                outcome = call => outcome,
            };
            let duration_ms = clock.elapsed().as_millis() as u64;

            let (message, retry_error) = match outcome {
                Ok(Ok(output)) => {
                    let result = stages::check_contract(&input, &output)
                        .map(|_| output)
                        .map_err(|reason| Error::TaskContract {
                            task_id: input.task_id.clone(),
                            reason,
                        });
                    attempts.push(AttemptRecord {
                        attempt,
                        started_at: attempt_start,
                        duration_ms,
                        error: result.as_ref().err().map(|e| e.to_string()),
                    });
                    return CallOutcome::Finished {
                        started_at,
                        attempts,
                        result,
                    };
                }
                Ok(Err(e)) if !e.is_transient() => {
                    attempts.push(AttemptRecord {
                        attempt,
                        started_at: attempt_start,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    return CallOutcome::Finished {
                        started_at,
                        attempts,
                        result: Err(match e {
                            EvaluatorError::Unavailable(_) => Error::TaskFailed {
                                task_id: input.task_id.clone(),
                                reason: e.to_string(),
                                attempts: attempt,
                            },
                            _ => Error::TaskContract {
                                task_id: input.task_id.clone(),
                                reason: e.to_string(),
                            },
                        }),
                    };
                }
                Ok(Err(e)) => (e.to_string(), Some(e)),
                Err(_) => (format!("timed out after {:?}", timeout), None),
            };

            attempts.push(AttemptRecord {
                attempt,
                started_at: attempt_start,
                duration_ms,
                error: Some(message.clone()),
            });

            if attempt == max_attempts {
                let result = match retry_error {
                    None => Err(Error::TaskTimeout {
                        task_id: input.task_id.clone(),
                        timeout,
                        attempts: attempt,
                    }),
                    Some(_) => Err(Error::TaskFailed {
                        task_id: input.task_id.clone(),
                        reason: message,
                        attempts: attempt,
                    }),
                };
                return CallOutcome::Finished {
                    started_at,
                    attempts,
                    result,
                };
            }

            let delay = self.config.backoff(attempt, retry_error.as_ref());
            warn!(
                task_id = %input.task_id,
                attempt,
                max_attempts,
                ?delay,
                error = %message,
                "Transient failure, retrying"
            );
            self.emit(ExecutionEvent::TaskRetrying {
                task_id: input.task_id.clone(),
                attempt,
                delay,
                error: message,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return CallOutcome::Abandoned { started_at, attempts },
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // max_attempts >= 1, so the loop always returns
        CallOutcome::Finished {
            started_at,
            attempts,
            result: Err(Error::TaskFailed {
                task_id: input.task_id.clone(),
                reason: "no attempts made".to_string(),
                attempts: 0,
            }),
        }
    }

    /// Write a finished task's status and result into the context
    fn record_result(
        &self,
        ctx: &mut RunContext,
        phase: usize,
        role: &TaskRole,
        id: &str,
        result: Result<TaskOutput, Error>,
    ) {
        match result {
            Ok(output) => {
                if let Some(task) = ctx.dag.get_task_mut(id) {
                    task.succeed();
                }
                ctx.results.insert(id.to_string(), output);
            }
            Err(error) => {
                // A failed specialist degrades its group instead of failing the run
                let recoverable = role.is_specialist();
                if let Some(task) = ctx.dag.get_task_mut(id) {
                    match &error {
                        Error::TaskTimeout { .. } => task.time_out(error.to_string()),
                        _ => task.fail(error.to_string()),
                    }
                }
                if recoverable {
                    warn!(task_id = id, %error, "Specialist unavailable");
                } else {
                    warn!(task_id = id, %error, "Task failed");
                }
                ctx.record_error(Some(id), Some(phase), error, recoverable);
            }
        }
        self.finished(ctx, phase, id);
    }

    fn finished(&self, ctx: &RunContext, phase: usize, id: &str) {
        if let Some(task) = ctx.dag.get_task(id) {
            self.emit(ExecutionEvent::TaskFinished {
                phase,
                task_id: id.to_string(),
                status: task.status.clone(),
            });
        }
    }

    fn record_cancel(&self, ctx: &mut RunContext, phase: usize) {
        info!(run_id = ctx.run_id(), phase, "Run cancelled");
        ctx.record_error(None, Some(phase), Error::Cancelled, false);
        self.emit(ExecutionEvent::RunCancelled { phase });
    }

    fn conclude(&self, mut ctx: RunContext, cancelled: bool) -> Result<RunContext, ExecutionError> {
        ctx.completed_at = Some(Utc::now());

        let terminal_ok = ctx
            .dag
            .terminal()
            .map(|t| t.is_succeeded())
            .unwrap_or(false);

        ctx.status = if cancelled {
            RunStatus::Cancelled
        } else if terminal_ok && ctx.program().is_some() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        let stats = ctx.dag.stats();
        info!(
            run_id = ctx.run_id(),
            status = ctx.status.as_str(),
            succeeded = stats.succeeded,
            failed = stats.failed + stats.timed_out,
            skipped = stats.skipped,
            "Run finished"
        );
        self.emit(ExecutionEvent::RunFinished {
            run_id: ctx.run_id().to_string(),
            status: ctx.status,
        });

        if ctx.status == RunStatus::Succeeded {
            return Ok(ctx);
        }

        let cause = ctx.first_fatal().cloned().unwrap_or_else(|| {
            let terminal = ctx
                .dag
                .terminal()
                .map(|t| t.id.clone())
                .unwrap_or_default();
            Error::TaskFailed {
                task_id: terminal,
                reason: "terminal task did not succeed".to_string(),
                attempts: 0,
            }
        });
        Err(ExecutionError::new(cause, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ExecutorConfig {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(config.backoff(1, None), Duration::from_millis(100));
        assert_eq!(config.backoff(2, None), Duration::from_millis(200));
        assert_eq!(config.backoff(3, None), Duration::from_millis(400));
        assert_eq!(config.backoff(4, None), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let config = ExecutorConfig::default();
        let limited = EvaluatorError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(config.backoff(1, Some(&limited)), Duration::from_secs(2));

        let huge = EvaluatorError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(config.backoff(1, Some(&huge)), config.max_backoff);
    }
}
