use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Training experience level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    /// Less than a year of consistent training
    Beginner,
    /// One to three years
    Intermediate,
    /// Three years or more
    Advanced,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessGoal {
    Strength,
    Hypertrophy,
    Powerlifting,
    Endurance,
    GeneralFitness,
    Athletic,
    FatLoss,
}

impl FitnessGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitnessGoal::Strength => "strength",
            FitnessGoal::Hypertrophy => "hypertrophy",
            FitnessGoal::Powerlifting => "powerlifting",
            FitnessGoal::Endurance => "endurance",
            FitnessGoal::GeneralFitness => "general_fitness",
            FitnessGoal::Athletic => "athletic",
            FitnessGoal::FatLoss => "fat_loss",
        }
    }
}

/// Current working weight for a lift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthLevel {
    pub exercise: String,
    /// Weight in kg
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub is_estimated_1rm: bool,
}

impl StrengthLevel {
    /// Epley estimate
    pub fn estimated_1rm(&self) -> f64 {
        if self.is_estimated_1rm || self.reps <= 1 {
            return self.weight;
        }
        self.weight * (1.0 + self.reps as f64 / 30.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    #[default]
    Moderate,
    Severe,
}

/// Injury or movement limitation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limitation {
    pub description: String,
    #[serde(default)]
    pub affected_exercises: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// Immutable profile snapshot handed to a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub goals: Vec<FitnessGoal>,
    /// Training days per week
    pub schedule_days: u32,
    /// Minutes per session
    #[serde(default = "default_session_duration")]
    pub session_duration: u32,
    #[serde(default)]
    pub strength_levels: Vec<StrengthLevel>,
    #[serde(default)]
    pub limitations: Vec<Limitation>,
    #[serde(default)]
    pub age: Option<u32>,
    /// Body weight in kg
    #[serde(default)]
    pub body_weight: Option<f64>,
    #[serde(default)]
    pub notes: String,
}

fn default_session_duration() -> u32 {
    60
}

impl UserProfile {
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.name.trim().is_empty() {
            return Err(PlanError::InvalidProfile("name is empty".to_string()));
        }
        if !(1..=7).contains(&self.schedule_days) {
            return Err(PlanError::InvalidProfile(format!(
                "schedule_days must be between 1 and 7, got {}",
                self.schedule_days
            )));
        }
        if self.session_duration == 0 {
            return Err(PlanError::InvalidProfile(
                "session_duration must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Exercise names the profile's limitations rule out, lowercased
    pub fn restricted_exercises(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .limitations
            .iter()
            .flat_map(|l| l.affected_exercises.iter())
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Summary text for evaluator context
    pub fn summary(&self) -> String {
        let mut summary = format!("User: {}\n", self.name);
        summary.push_str(&format!("Experience: {}\n", self.experience_level.as_str()));
        let goals: Vec<&str> = self.goals.iter().map(|g| g.as_str()).collect();
        summary.push_str(&format!("Goals: {}\n", goals.join(", ")));
        summary.push_str(&format!(
            "Training days: {}/week, {} min/session\n",
            self.schedule_days, self.session_duration
        ));

        if !self.strength_levels.is_empty() {
            summary.push_str("Current strength:\n");
            for sl in &self.strength_levels {
                summary.push_str(&format!(
                    "  - {}: {}kg x {} (est. 1RM: {:.1}kg)\n",
                    sl.exercise,
                    sl.weight,
                    sl.reps,
                    sl.estimated_1rm()
                ));
            }
        }

        if !self.limitations.is_empty() {
            summary.push_str("Limitations:\n");
            for lim in &self.limitations {
                summary.push_str(&format!("  - {} ({:?})\n", lim.description, lim.severity));
            }
        }

        if let Some(bw) = self.body_weight {
            summary.push_str(&format!("Body weight: {}kg\n", bw));
        }

        if !self.notes.is_empty() {
            summary.push_str(&format!("Notes: {}\n", self.notes));
        }

        summary
    }
}

/// What the user asked for, in their words, plus the program length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStatement {
    pub text: String,
    #[serde(default = "default_weeks")]
    pub weeks: u32,
}

fn default_weeks() -> u32 {
    4
}

impl GoalStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            weeks: default_weeks(),
        }
    }

    pub fn with_weeks(mut self, weeks: u32) -> Self {
        self.weeks = weeks;
        self
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.text.trim().is_empty() {
            return Err(PlanError::InvalidGoals("goal statement is empty".to_string()));
        }
        if !(1..=6).contains(&self.weeks) {
            return Err(PlanError::InvalidGoals(format!(
                "program length must be 1-6 weeks, got {}",
                self.weeks
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> UserProfile {
        UserProfile {
            name: "Sam".to_string(),
            experience_level: ExperienceLevel::Intermediate,
            goals: vec![FitnessGoal::Strength, FitnessGoal::Hypertrophy],
            schedule_days: 4,
            session_duration: 75,
            strength_levels: vec![StrengthLevel {
                exercise: "Squat".to_string(),
                weight: 100.0,
                reps: 5,
                is_estimated_1rm: false,
            }],
            limitations: vec![Limitation {
                description: "Cranky shoulder".to_string(),
                affected_exercises: vec!["Overhead Press ".to_string()],
                severity: Severity::Mild,
            }],
            age: Some(31),
            body_weight: Some(82.0),
            notes: String::new(),
        }
    }

    #[test]
    fn test_epley() {
        let sl = StrengthLevel {
            exercise: "Bench".into(),
            weight: 90.0,
            reps: 6,
            is_estimated_1rm: false,
        };
        assert!((sl.estimated_1rm() - 108.0).abs() < 1e-9);

        let single = StrengthLevel { reps: 1, ..sl };
        assert_eq!(single.estimated_1rm(), 90.0);
    }

    #[test]
    fn test_profile_validation() {
        let mut profile = sample_profile();
        assert!(profile.validate().is_ok());

        profile.schedule_days = 0;
        assert!(matches!(profile.validate(), Err(PlanError::InvalidProfile(_))));
    }

    #[test]
    fn test_restricted_exercises_normalized() {
        assert_eq!(sample_profile().restricted_exercises(), vec!["overhead press"]);
    }

    #[test]
    fn test_goal_weeks_bounds() {
        assert!(GoalStatement::new("get strong").validate().is_ok());
        assert!(GoalStatement::new("get strong").with_weeks(7).validate().is_err());
        assert!(GoalStatement::new("  ").validate().is_err());
    }

    #[test]
    fn test_summary_mentions_limits() {
        let summary = sample_profile().summary();
        assert!(summary.contains("Experience: intermediate"));
        assert!(summary.contains("Cranky shoulder"));
        assert!(summary.contains("est. 1RM: 116.7kg"));
    }
}
