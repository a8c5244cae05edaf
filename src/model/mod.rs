mod analysis;
mod equipment;
pub mod exercises;
mod profile;
mod program;

pub use analysis::{EquipmentAssessment, GymType, RecoveryCapacity, RefinementBrief, UserAnalysis};
pub use equipment::{EquipmentInventory, EquipmentType, PlatePair, WeightUnit};
pub use profile::{
    ExperienceLevel, FitnessGoal, GoalStatement, Limitation, Severity, StrengthLevel, UserProfile,
};
pub use program::{
    exercise_key, ExerciseSpec, FinalProgram, Periodization, ProgramDay, ProgramDraft,
    ProgramFramework, ProgramStructure, ProgramWeek, ProgressionScheme, RevisionPoint, SplitType,
};
