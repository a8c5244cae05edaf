use serde::{Deserialize, Serialize};

use crate::model::{exercise_key, ExerciseSpec, Periodization, ProgressionScheme};

/// The fixed set of specialist kinds a roster is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    StrengthCoach,
    HypertrophyExpert,
    PeriodizationSpecialist,
    RecoveryAnalyst,
}

impl SpecialistKind {
    pub const ALL: [SpecialistKind; 4] = [
        SpecialistKind::StrengthCoach,
        SpecialistKind::HypertrophyExpert,
        SpecialistKind::PeriodizationSpecialist,
        SpecialistKind::RecoveryAnalyst,
    ];

    pub fn default_roster() -> Vec<SpecialistKind> {
        Self::ALL.to_vec()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SpecialistKind::StrengthCoach => "Strength Coach",
            SpecialistKind::HypertrophyExpert => "Hypertrophy Expert",
            SpecialistKind::PeriodizationSpecialist => "Periodization Specialist",
            SpecialistKind::RecoveryAnalyst => "Recovery Analyst",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            SpecialistKind::StrengthCoach => "strength-coach",
            SpecialistKind::HypertrophyExpert => "hypertrophy-expert",
            SpecialistKind::PeriodizationSpecialist => "periodization-specialist",
            SpecialistKind::RecoveryAnalyst => "recovery-analyst",
        }
    }

    /// What this specialist evaluates; disjoint across the roster
    pub fn focus(&self) -> &'static str {
        match self {
            SpecialistKind::StrengthCoach => {
                "compound lift selection, low-rep strength work and load progression"
            }
            SpecialistKind::HypertrophyExpert => {
                "weekly volume, rep ranges and accessory exercise selection"
            }
            SpecialistKind::PeriodizationSpecialist => {
                "periodization model, intensity waves and deload placement"
            }
            SpecialistKind::RecoveryAnalyst => {
                "recovery demands, injury limitations and exercises to remove"
            }
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|k| k.slug().replace('-', "_") == normalized)
    }
}

impl std::fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single typed modification to the shared draft
///
/// `day` is an index into each week's days; adjustments apply to every week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Adjustment {
    AddExercise {
        day: usize,
        exercise: ExerciseSpec,
    },
    RemoveExercise {
        day: usize,
        name: String,
    },
    SetVolume {
        day: usize,
        name: String,
        sets: u32,
        reps_min: u32,
        reps_max: u32,
    },
    SetProgression {
        name: String,
        scheme: ProgressionScheme,
        increment: f64,
    },
    /// 1-based week numbers to deload
    SetDeloadWeeks {
        weeks: Vec<u32>,
    },
    SetPeriodization {
        periodization: Periodization,
    },
}

/// The point of the draft an adjustment touches; two adjustments with the same
/// key and different content are a disagreement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "point", rename_all = "snake_case")]
pub enum AdjustmentKey {
    /// Presence of an exercise on a day (add vs. remove)
    Exercise { day: usize, name: String },
    Volume { day: usize, name: String },
    Progression { name: String },
    Deload,
    Periodization,
}

impl Adjustment {
    pub fn key(&self) -> AdjustmentKey {
        match self {
            Adjustment::AddExercise { day, exercise } => AdjustmentKey::Exercise {
                day: *day,
                name: exercise.key(),
            },
            Adjustment::RemoveExercise { day, name } => AdjustmentKey::Exercise {
                day: *day,
                name: exercise_key(name),
            },
            Adjustment::SetVolume { day, name, .. } => AdjustmentKey::Volume {
                day: *day,
                name: exercise_key(name),
            },
            Adjustment::SetProgression { name, .. } => AdjustmentKey::Progression {
                name: exercise_key(name),
            },
            Adjustment::SetDeloadWeeks { .. } => AdjustmentKey::Deload,
            Adjustment::SetPeriodization { .. } => AdjustmentKey::Periodization,
        }
    }

    /// Day index the adjustment targets, if any
    pub fn day(&self) -> Option<usize> {
        match self {
            Adjustment::AddExercise { day, .. }
            | Adjustment::RemoveExercise { day, .. }
            | Adjustment::SetVolume { day, .. } => Some(*day),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Adjustment::AddExercise { day, exercise } => format!(
                "add {} {}x{}-{} on day {}",
                exercise.name,
                exercise.sets,
                exercise.reps_min,
                exercise.reps_max,
                day + 1
            ),
            Adjustment::RemoveExercise { day, name } => {
                format!("remove {} from day {}", name, day + 1)
            }
            Adjustment::SetVolume {
                day,
                name,
                sets,
                reps_min,
                reps_max,
            } => format!(
                "{} on day {}: {}x{}-{}",
                name,
                day + 1,
                sets,
                reps_min,
                reps_max
            ),
            Adjustment::SetProgression {
                name,
                scheme,
                increment,
            } => format!("{} progression {:?} +{}", name, scheme, increment),
            Adjustment::SetDeloadWeeks { weeks } => format!("deload weeks {:?}", weeks),
            Adjustment::SetPeriodization { periodization } => {
                format!("periodization {:?}", periodization)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub adjustment: Adjustment,
    pub rationale: String,
}

impl Proposal {
    pub fn new(adjustment: Adjustment, rationale: impl Into<String>) -> Self {
        Self {
            adjustment,
            rationale: rationale.into(),
        }
    }
}

/// A specialist's structured output over the shared draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub specialist: SpecialistKind,
    pub summary: String,
    #[serde(default)]
    pub proposals: Vec<Proposal>,
}
