//! Generation and refinement entry points: plan, execute, archive.

use thiserror::Error;
use tracing::{info, warn};

use crate::archive::RunArchive;
use crate::dag::{DagManager, GenerationPlanner, RunContext, RunInputs, RunSnapshot};
use crate::deliberation::SpecialistKind;
use crate::error::{ExecutionError, PlanError};
use crate::executor::Executor;
use crate::model::{EquipmentInventory, GoalStatement, RevisionPoint, UserProfile};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Execution(Box<ExecutionError>),
}

impl From<ExecutionError> for PipelineError {
    fn from(e: ExecutionError) -> Self {
        PipelineError::Execution(Box::new(e))
    }
}

impl PipelineError {
    /// Context of the failed run, if it got far enough to have one
    pub fn context(&self) -> Option<&RunContext> {
        match self {
            PipelineError::Plan(_) => None,
            PipelineError::Execution(e) => Some(&e.context),
        }
    }
}

pub struct ProgramGenerator {
    planner: GenerationPlanner,
    executor: Executor,
    archive: Option<RunArchive>,
}

impl ProgramGenerator {
    pub fn new(executor: Executor, roster: Vec<SpecialistKind>) -> Result<Self, PlanError> {
        Ok(Self {
            planner: GenerationPlanner::new(roster)?,
            executor,
            archive: None,
        })
    }

    /// Archive every run this generator finishes, success or failure
    pub fn with_archive(mut self, archive: RunArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn planner(&self) -> &GenerationPlanner {
        &self.planner
    }

    /// Validated generation DAG without running it
    pub fn plan(
        &self,
        profile: &UserProfile,
        goals: &GoalStatement,
        equipment: &EquipmentInventory,
    ) -> Result<DagManager, PlanError> {
        self.planner.build(profile, goals, equipment)
    }

    /// Fresh generation context; callers may take its cancel handle before running
    pub fn prepare(
        &self,
        profile: UserProfile,
        goals: GoalStatement,
        equipment: EquipmentInventory,
    ) -> Result<RunContext, PlanError> {
        let dag = self.plan(&profile, &goals, &equipment)?;
        Ok(RunContext::new(dag, RunInputs::new(profile, goals, equipment)))
    }

    /// Refinement context seeded with the prior run's program
    pub fn prepare_refinement(
        &self,
        prior: &RunSnapshot,
        instruction: &str,
    ) -> Result<RunContext, PlanError> {
        let program = prior
            .program()
            .ok_or_else(|| PlanError::NoPriorProgram(prior.run_id.clone()))?;
        let iteration = prior.iteration + 1;
        let dag = self
            .planner
            .build_refinement(program, instruction, iteration)?;

        let inputs = RunInputs::new(
            prior.inputs.profile.clone(),
            prior.inputs.goals.clone(),
            prior.inputs.equipment.clone(),
        )
        .refinement(program.clone(), instruction);

        Ok(RunContext::new(dag, inputs).with_parent(prior.run_id.clone(), iteration))
    }

    /// Revision context: the prior program with everything before `point`
    /// frozen, deliberated again under `reason`
    pub fn prepare_revision(
        &self,
        prior: &RunSnapshot,
        point: RevisionPoint,
        reason: &str,
    ) -> Result<RunContext, PlanError> {
        let program = prior
            .program()
            .ok_or_else(|| PlanError::NoPriorProgram(prior.run_id.clone()))?;
        let iteration = prior.iteration + 1;
        let dag = self.planner.build_revision(program, point, iteration)?;

        let reason = match reason.trim() {
            "" => format!("Revise from {}", point.describe()),
            given => given.to_string(),
        };
        let inputs = RunInputs::new(
            prior.inputs.profile.clone(),
            prior.inputs.goals.clone(),
            prior.inputs.equipment.clone(),
        )
        .refinement(program.clone(), reason)
        .revising_from(point);

        Ok(RunContext::new(dag, inputs).with_parent(prior.run_id.clone(), iteration))
    }

    pub async fn generate(
        &self,
        profile: UserProfile,
        goals: GoalStatement,
        equipment: EquipmentInventory,
    ) -> Result<RunContext, PipelineError> {
        let ctx = self.prepare(profile, goals, equipment)?;
        self.run(ctx).await
    }

    pub async fn refine_from(
        &self,
        prior: &RunSnapshot,
        instruction: &str,
    ) -> Result<RunContext, PipelineError> {
        let ctx = self.prepare_refinement(prior, instruction)?;
        info!(
            parent = %prior.run_id,
            iteration = ctx.iteration,
            "Refining program"
        );
        self.run(ctx).await
    }

    pub async fn revise_from(
        &self,
        prior: &RunSnapshot,
        point: RevisionPoint,
        reason: &str,
    ) -> Result<RunContext, PipelineError> {
        let ctx = self.prepare_revision(prior, point, reason)?;
        info!(
            parent = %prior.run_id,
            from = %point.describe(),
            iteration = ctx.iteration,
            "Revising program"
        );
        self.run(ctx).await
    }

    /// Execute a prepared context and archive the outcome
    pub async fn run(&self, ctx: RunContext) -> Result<RunContext, PipelineError> {
        let result = self.executor.execute(ctx).await;
        match &result {
            Ok(ctx) => self.archive(ctx),
            Err(e) => self.archive(&e.context),
        }
        result.map_err(PipelineError::from)
    }

    fn archive(&self, ctx: &RunContext) {
        let Some(archive) = &self.archive else {
            return;
        };
        if let Err(e) = archive.save(&ctx.snapshot()) {
            warn!(run_id = ctx.run_id(), "Failed to archive run: {:#}", e);
        }
    }
}
