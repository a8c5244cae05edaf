use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskRole};
use crate::deliberation::{ArbiterInput, Arbitration, Opinion};
use crate::model::{
    EquipmentAssessment, EquipmentInventory, FinalProgram, GoalStatement, ProgramDraft,
    RefinementBrief, RevisionPoint, UserAnalysis, UserProfile,
};

/// Immutable run-level inputs, shared by every task of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInputs {
    pub profile: UserProfile,
    pub goals: GoalStatement,
    pub equipment: EquipmentInventory,
    /// Set for refinement runs
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub prior_program: Option<FinalProgram>,
    /// Set for revisions: only the part from this point on may change
    #[serde(default)]
    pub revision: Option<RevisionPoint>,
}

impl RunInputs {
    pub fn new(profile: UserProfile, goals: GoalStatement, equipment: EquipmentInventory) -> Self {
        Self {
            profile,
            goals,
            equipment,
            instruction: None,
            prior_program: None,
            revision: None,
        }
    }

    pub fn refinement(mut self, prior: FinalProgram, instruction: impl Into<String>) -> Self {
        self.prior_program = Some(prior);
        self.instruction = Some(instruction.into());
        self
    }

    pub fn revising_from(mut self, point: RevisionPoint) -> Self {
        self.revision = Some(point);
        self
    }
}

/// Typed task result; which variant a role must produce is its output contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "artifact", rename_all = "snake_case")]
pub enum TaskOutput {
    UserAnalysis(UserAnalysis),
    EquipmentAssessment(EquipmentAssessment),
    Brief(RefinementBrief),
    Draft(ProgramDraft),
    Opinion(Opinion),
    Arbitration(Arbitration),
    Program(FinalProgram),
}

impl TaskOutput {
    pub fn name(&self) -> &'static str {
        match self {
            TaskOutput::UserAnalysis(_) => "user_analysis",
            TaskOutput::EquipmentAssessment(_) => "equipment_assessment",
            TaskOutput::Brief(_) => "brief",
            TaskOutput::Draft(_) => "draft",
            TaskOutput::Opinion(_) => "opinion",
            TaskOutput::Arbitration(_) => "arbitration",
            TaskOutput::Program(_) => "program",
        }
    }

    /// Artifact a role is contracted to produce
    pub fn expected_for(role: &TaskRole) -> &'static str {
        match role {
            TaskRole::UserAnalysis => "user_analysis",
            TaskRole::EquipmentAssessment => "equipment_assessment",
            TaskRole::RefinementIntake => "brief",
            TaskRole::FrameworkDesign | TaskRole::ProgramSeed => "draft",
            TaskRole::Specialist { .. } => "opinion",
            TaskRole::Arbiter => "arbitration",
            TaskRole::Finalize => "program",
        }
    }
}

/// Input assembled for one task from completed upstream results
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub task_id: TaskId,
    pub role: TaskRole,
    /// 1-based attempt number
    pub attempt: u32,
    pub run: Arc<RunInputs>,
    /// Outputs of direct dependencies, keyed by task id
    pub upstream: BTreeMap<TaskId, TaskOutput>,
    /// Roster entries, only for arbiter tasks
    pub deliberation: Option<ArbiterInput>,
}

impl TaskInput {
    pub fn user_analysis(&self) -> Option<&UserAnalysis> {
        self.upstream.values().find_map(|o| match o {
            TaskOutput::UserAnalysis(a) => Some(a),
            _ => None,
        })
    }

    pub fn equipment_assessment(&self) -> Option<&EquipmentAssessment> {
        self.upstream.values().find_map(|o| match o {
            TaskOutput::EquipmentAssessment(a) => Some(a),
            _ => None,
        })
    }

    pub fn brief(&self) -> Option<&RefinementBrief> {
        self.upstream.values().find_map(|o| match o {
            TaskOutput::Brief(b) => Some(b),
            _ => None,
        })
    }

    pub fn draft(&self) -> Option<&ProgramDraft> {
        self.upstream.values().find_map(|o| match o {
            TaskOutput::Draft(d) => Some(d),
            _ => None,
        })
    }

    pub fn arbitration(&self) -> Option<&Arbitration> {
        self.upstream.values().find_map(|o| match o {
            TaskOutput::Arbitration(a) => Some(a),
            _ => None,
        })
    }
}
