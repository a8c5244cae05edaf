use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::manager::{DagManager, EdgeType};
use super::task::{Task, TaskId, TaskRole};
use crate::deliberation::SpecialistKind;
use crate::error::PlanError;
use crate::model::{EquipmentInventory, FinalProgram, GoalStatement, RevisionPoint, UserProfile};

/// Declarative description of one run's DAG
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionPlan {
    pub tasks: Vec<TaskSpec>,
    pub edges: Vec<EdgeSpec>,
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub subject: String,
    pub role: TaskRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: TaskId,
    pub to: TaskId,
    pub edge_type: EdgeType,
}

/// A deliberation group: fork from `seed`, join into `arbiter`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub seed: TaskId,
    pub specialists: Vec<TaskId>,
    pub arbiter: TaskId,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build DagManager from the plan; every edge goes through the cycle check
    pub fn build_dag(&self) -> Result<DagManager, PlanError> {
        self.validate()?;
        let mut dag = DagManager::new();

        for spec in &self.tasks {
            dag.add_task(Task::new(&spec.id, &spec.subject, spec.role))?;
        }

        for edge in &self.edges {
            match edge.edge_type {
                EdgeType::Dependency => dag.add_dependency(&edge.to, &edge.from)?,
                EdgeType::Fork => dag.fork(&edge.from, &[edge.to.as_str()])?,
            }
        }

        for group in &self.groups {
            let specialists: Vec<&str> = group.specialists.iter().map(|s| s.as_str()).collect();
            dag.add_deliberation_group(&group.seed, &specialists, &group.arbiter)?;
        }

        Ok(dag)
    }

    /// Reference checks that do not need the graph
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut ids = HashSet::new();
        for task in &self.tasks {
            if !ids.insert(task.id.as_str()) {
                return Err(PlanError::DuplicateTask(task.id.clone()));
            }
        }

        let known = |id: &str| -> Result<(), PlanError> {
            if ids.contains(id) {
                Ok(())
            } else {
                Err(PlanError::UnknownTask(id.to_string()))
            }
        };

        for edge in &self.edges {
            known(&edge.from)?;
            known(&edge.to)?;
        }

        for group in &self.groups {
            if group.specialists.is_empty() {
                return Err(PlanError::EmptyRoster);
            }
            known(&group.seed)?;
            known(&group.arbiter)?;
            for s in &group.specialists {
                known(s)?;
            }
        }

        Ok(())
    }
}

/// Builder for creating execution plans programmatically
#[derive(Default)]
pub struct PlanBuilder {
    plan: ExecutionPlan,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, id: &str, subject: &str, role: TaskRole) -> Self {
        self.plan.tasks.push(TaskSpec {
            id: id.to_string(),
            subject: subject.to_string(),
            role,
        });
        self
    }

    /// `to` depends on `from`
    pub fn dependency(mut self, from: &str, to: &str) -> Self {
        self.plan.edges.push(EdgeSpec {
            from: from.to_string(),
            to: to.to_string(),
            edge_type: EdgeType::Dependency,
        });
        self
    }

    /// Add a join (multiple dependencies to one target)
    pub fn join(mut self, sources: &[&str], target: &str) -> Self {
        for source in sources {
            self = self.dependency(source, target);
        }
        self
    }

    pub fn deliberation(mut self, seed: &str, specialists: &[&str], arbiter: &str) -> Self {
        self.plan.groups.push(GroupSpec {
            seed: seed.to_string(),
            specialists: specialists.iter().map(|s| s.to_string()).collect(),
            arbiter: arbiter.to_string(),
        });
        self
    }

    /// Build and validate the plan
    pub fn build(self) -> Result<ExecutionPlan, PlanError> {
        self.plan.validate()?;
        Ok(self.plan)
    }

    /// Build without validation (for testing)
    pub fn build_unchecked(self) -> ExecutionPlan {
        self.plan
    }
}

/// Emits the fixed generation and refinement skeletons
///
/// Pure: the same roster and inputs always give the same DAG, ids included.
#[derive(Debug, Clone)]
pub struct GenerationPlanner {
    roster: Vec<SpecialistKind>,
}

impl GenerationPlanner {
    pub fn new(roster: Vec<SpecialistKind>) -> Result<Self, PlanError> {
        if roster.is_empty() {
            return Err(PlanError::EmptyRoster);
        }
        let mut seen = HashSet::new();
        for kind in &roster {
            if !seen.insert(*kind) {
                return Err(PlanError::DuplicateSpecialist(kind.slug().to_string()));
            }
        }
        Ok(Self { roster })
    }

    pub fn roster(&self) -> &[SpecialistKind] {
        &self.roster
    }

    /// Generation DAG: analysis -> framework -> specialists -> arbiter -> finalize
    pub fn build(
        &self,
        profile: &UserProfile,
        goals: &GoalStatement,
        equipment: &EquipmentInventory,
    ) -> Result<DagManager, PlanError> {
        profile.validate()?;
        goals.validate()?;
        equipment.validate()?;
        self.generation_plan().build_dag()
    }

    pub fn generation_plan(&self) -> ExecutionPlan {
        let id = |role: TaskRole| format!("gen-{}", role.slug());
        let user = id(TaskRole::UserAnalysis);
        let equipment = id(TaskRole::EquipmentAssessment);
        let framework = id(TaskRole::FrameworkDesign);

        let builder = PlanBuilder::new()
            .task(&user, "Analyze user profile", TaskRole::UserAnalysis)
            .task(&equipment, "Assess equipment", TaskRole::EquipmentAssessment)
            .task(&framework, "Design program framework", TaskRole::FrameworkDesign)
            .join(&[user.as_str(), equipment.as_str()], &framework);

        self.with_deliberation(builder, "gen", &framework)
            .build_unchecked()
    }

    /// Refinement DAG: the prior program re-enters as the seed of a new
    /// deliberation group; ids carry the iteration so they never repeat
    pub fn build_refinement(
        &self,
        prior: &FinalProgram,
        instruction: &str,
        iteration: u32,
    ) -> Result<DagManager, PlanError> {
        if instruction.trim().is_empty() {
            return Err(PlanError::InvalidGoals(
                "refinement instruction is empty".to_string(),
            ));
        }
        prior
            .program
            .validate_shape()
            .map_err(|reason| PlanError::InvalidGoals(format!("prior program is malformed: {}", reason)))?;
        self.refinement_plan(iteration).build_dag()
    }

    /// Revision DAG: same re-entry shape as refinement, but the seeded draft
    /// freezes everything before `point`
    pub fn build_revision(
        &self,
        prior: &FinalProgram,
        point: RevisionPoint,
        iteration: u32,
    ) -> Result<DagManager, PlanError> {
        prior
            .program
            .validate_shape()
            .map_err(|reason| PlanError::InvalidGoals(format!("prior program is malformed: {}", reason)))?;
        point
            .check(&prior.program)
            .map_err(PlanError::InvalidRevisionPoint)?;
        self.revision_plan(iteration).build_dag()
    }

    pub fn refinement_plan(&self, iteration: u32) -> ExecutionPlan {
        self.reentry_plan(&format!("ref{}", iteration), "Read refinement instruction")
    }

    pub fn revision_plan(&self, iteration: u32) -> ExecutionPlan {
        self.reentry_plan(&format!("rev{}", iteration), "Read revision reason")
    }

    fn reentry_plan(&self, prefix: &str, intake_subject: &str) -> ExecutionPlan {
        let intake = format!("{}-{}", prefix, TaskRole::RefinementIntake.slug());
        let seed = format!("{}-{}", prefix, TaskRole::ProgramSeed.slug());

        let builder = PlanBuilder::new()
            .task(&intake, intake_subject, TaskRole::RefinementIntake)
            .task(&seed, "Seed prior program", TaskRole::ProgramSeed)
            .dependency(&intake, &seed);

        self.with_deliberation(builder, prefix, &seed).build_unchecked()
    }

    fn with_deliberation(&self, mut builder: PlanBuilder, prefix: &str, seed: &str) -> PlanBuilder {
        let specialists: Vec<(String, TaskRole)> = self
            .roster
            .iter()
            .enumerate()
            .map(|(position, kind)| {
                let role = TaskRole::Specialist {
                    kind: *kind,
                    position,
                };
                (format!("{}-{}", prefix, role.slug()), role)
            })
            .collect();
        let arbiter = format!("{}-{}", prefix, TaskRole::Arbiter.slug());
        let finalize = format!("{}-{}", prefix, TaskRole::Finalize.slug());

        for (kind, (id, role)) in self.roster.iter().zip(&specialists) {
            builder = builder.task(id, kind.display_name(), *role);
        }
        let ids: Vec<&str> = specialists.iter().map(|(id, _)| id.as_str()).collect();

        builder
            .task(&arbiter, "Arbitrate specialist opinions", TaskRole::Arbiter)
            .task(&finalize, "Validate and format program", TaskRole::Finalize)
            .deliberation(seed, &ids, &arbiter)
            .dependency(&arbiter, &finalize)
    }
}
