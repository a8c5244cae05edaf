use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deliberation::SpecialistKind;

pub type TaskId = String;

/// Whether a task suspends on an external evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Runs synchronously inside the phase, no I/O
    LocalCompute,
    /// Dispatched to the evaluator under timeout and retry
    ExternalCall,
}

/// What a task computes; fixes its input assembly and output contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TaskRole {
    UserAnalysis,
    EquipmentAssessment,
    FrameworkDesign,
    RefinementIntake,
    ProgramSeed,
    Specialist {
        kind: SpecialistKind,
        /// Fixed roster position, used to order arbiter input
        position: usize,
    },
    Arbiter,
    Finalize,
}

impl TaskRole {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskRole::UserAnalysis | TaskRole::FrameworkDesign | TaskRole::Specialist { .. } => {
                TaskKind::ExternalCall
            }
            TaskRole::EquipmentAssessment
            | TaskRole::RefinementIntake
            | TaskRole::ProgramSeed
            | TaskRole::Arbiter
            | TaskRole::Finalize => TaskKind::LocalCompute,
        }
    }

    /// Id fragment for the role
    pub fn slug(&self) -> String {
        match self {
            TaskRole::UserAnalysis => "user-analysis".to_string(),
            TaskRole::EquipmentAssessment => "equipment-assessment".to_string(),
            TaskRole::FrameworkDesign => "framework-design".to_string(),
            TaskRole::RefinementIntake => "refinement-intake".to_string(),
            TaskRole::ProgramSeed => "program-seed".to_string(),
            TaskRole::Specialist { kind, .. } => format!("specialist-{}", kind.slug()),
            TaskRole::Arbiter => "arbiter".to_string(),
            TaskRole::Finalize => "finalize".to_string(),
        }
    }

    pub fn is_specialist(&self) -> bool {
        matches!(self, TaskRole::Specialist { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed { reason: String },
    TimedOut { reason: String },
    Skipped { reason: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded
                | TaskStatus::Failed { .. }
                | TaskStatus::TimedOut { .. }
                | TaskStatus::Skipped { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::TimedOut { .. } => "timed-out",
            TaskStatus::Skipped { .. } => "skipped",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            TaskStatus::Failed { reason }
            | TaskStatus::TimedOut { reason }
            | TaskStatus::Skipped { reason } => Some(reason),
            _ => None,
        }
    }
}

/// One evaluator call, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// None when the attempt succeeded
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub subject: String,
    pub role: TaskRole,
    pub kind: TaskKind,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, subject: impl Into<String>, role: TaskRole) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            role,
            kind: role.kind(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempts: vec![],
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, TaskStatus::Pending)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self) {
        self.status = TaskStatus::Succeeded;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed {
            reason: reason.into(),
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn time_out(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::TimedOut {
            reason: reason.into(),
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Skipped {
            reason: reason.into(),
        };
        self.completed_at = Some(Utc::now());
    }

    /// Back to Pending after admission when the task was never dispatched
    pub fn unqueue(&mut self) {
        if matches!(self.status, TaskStatus::Ready) {
            self.status = TaskStatus::Pending;
        }
    }

    pub fn record_attempts(&mut self, attempts: Vec<AttemptRecord>) {
        self.attempts.extend(attempts);
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new("gen-arbiter", "Arbitrate", TaskRole::Arbiter);
        assert!(task.is_pending());
        assert_eq!(task.kind, TaskKind::LocalCompute);

        task.mark_ready();
        task.start();
        assert!(matches!(task.status, TaskStatus::Running));
        assert!(task.started_at.is_some());

        task.succeed();
        assert!(task.is_succeeded());
        assert!(task.is_terminal());
    }

    #[test]
    fn test_role_kinds() {
        let specialist = TaskRole::Specialist {
            kind: SpecialistKind::RecoveryAnalyst,
            position: 3,
        };
        assert_eq!(specialist.kind(), TaskKind::ExternalCall);
        assert_eq!(specialist.slug(), "specialist-recovery-analyst");
        assert_eq!(TaskRole::ProgramSeed.kind(), TaskKind::LocalCompute);
    }

    #[test]
    fn test_terminal_states() {
        let mut task = Task::new("t", "T", TaskRole::UserAnalysis);
        task.time_out("180s elapsed");
        assert_eq!(task.status.label(), "timed-out");
        assert_eq!(task.status.reason(), Some("180s elapsed"));
        assert!(!TaskStatus::Ready.is_terminal());
    }

    #[test]
    fn test_unqueue_only_touches_ready_tasks() {
        let mut task = Task::new("t", "T", TaskRole::UserAnalysis);
        task.mark_ready();
        task.unqueue();
        assert!(task.is_pending());

        task.start();
        task.unqueue();
        assert!(matches!(task.status, TaskStatus::Running));
    }
}
