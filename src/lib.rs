pub mod agents;
pub mod archive;
pub mod config;
pub mod dag;
pub mod deliberation;
pub mod error;
pub mod executor;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod stages;

pub use agents::{ClaudeEvaluator, Evaluator, RuleEvaluator};
pub use archive::{RunArchive, RunSummary};
pub use config::Config;
pub use dag::{DagManager, GenerationPlanner, RunContext, RunSnapshot, RunStatus};
pub use deliberation::{Arbiter, ArbitrationPolicy, PolicyKind, SpecialistKind};
pub use error::{Error, EvaluatorError, ExecutionError, PlanError};
pub use executor::{ExecutionEvent, Executor, ExecutorConfig, RunObserver};
pub use pipeline::{PipelineError, ProgramGenerator};
pub use render::{JsonRenderer, ProgramRenderer};
