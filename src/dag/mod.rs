mod context;
mod manager;
mod payload;
mod plan;
mod task;

pub use context::{RunContext, RunError, RunSnapshot, RunStatus};
pub use manager::{DagManager, DagState, DagStats, DeliberationGroup, Edge, EdgeType};
pub use payload::{RunInputs, TaskInput, TaskOutput};
pub use plan::{EdgeSpec, ExecutionPlan, GenerationPlanner, GroupSpec, PlanBuilder, TaskSpec};
pub use task::{AttemptRecord, Task, TaskId, TaskKind, TaskRole, TaskStatus};
