use serde::{Deserialize, Serialize};

use super::equipment::WeightUnit;
use super::profile::ExperienceLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryCapacity {
    Low,
    #[default]
    Moderate,
    High,
}

/// Phase-0 read of the user: who they are and what they can recover from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnalysis {
    pub experience_assessment: ExperienceLevel,
    pub primary_goals: Vec<String>,
    pub days_per_week: u32,
    pub session_duration: u32,
    #[serde(default)]
    pub recovery_capacity: RecoveryCapacity,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GymType {
    Commercial,
    HomeBarbell,
    HomeDumbbell,
    Minimal,
}

/// Phase-0 read of the equipment: which movements are on the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentAssessment {
    pub gym_type: GymType,
    pub compound_movements: Vec<String>,
    pub isolation_movements: Vec<String>,
    #[serde(default)]
    pub equipment_limitations: Vec<String>,
    pub min_increment: f64,
    #[serde(default)]
    pub unit: WeightUnit,
}

/// A refinement request folded into the shared input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementBrief {
    pub instruction: String,
    /// Lowercased keywords the instruction leans on ("volume", "deload", ...)
    #[serde(default)]
    pub emphasis: Vec<String>,
}

impl RefinementBrief {
    pub fn mentions(&self, keyword: &str) -> bool {
        self.emphasis.iter().any(|e| e == keyword)
    }
}
