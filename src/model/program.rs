use serde::{Deserialize, Serialize};

use crate::deliberation::SpecialistKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProgressionScheme {
    /// Add weight every successful session
    #[serde(rename = "lp")]
    Linear,
    /// Add weight after hitting the top of the rep range
    #[default]
    #[serde(rename = "dp")]
    Double,
    /// Add weight once total reps across sets reach a target
    #[serde(rename = "sum")]
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Periodization {
    Linear,
    Undulating,
    Block,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    FullBody,
    UpperLower,
    PushPullLegs,
}

impl SplitType {
    /// Split and per-day focus labels for a weekly frequency
    pub fn for_days(days: u32) -> (Self, Vec<String>) {
        let focuses: &[&str] = match days {
            0..=3 => &["Full Body", "Full Body", "Full Body"],
            4 => &["Upper", "Lower", "Upper", "Lower"],
            _ => &["Push", "Pull", "Legs", "Push", "Pull", "Legs", "Push"],
        };
        let split = match days {
            0..=3 => SplitType::FullBody,
            4 => SplitType::UpperLower,
            _ => SplitType::PushPullLegs,
        };
        let n = days.max(1) as usize;
        (split, focuses.iter().take(n).map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSpec {
    pub name: String,
    pub sets: u32,
    pub reps_min: u32,
    pub reps_max: u32,
    #[serde(default)]
    pub progression: ProgressionScheme,
    /// Load increment in the inventory's unit
    #[serde(default)]
    pub increment: f64,
    #[serde(default)]
    pub rpe_target: Option<f64>,
    #[serde(default)]
    pub amrap_final_set: bool,
    #[serde(default)]
    pub notes: String,
}

impl ExerciseSpec {
    pub fn new(name: impl Into<String>, sets: u32, reps_min: u32, reps_max: u32) -> Self {
        Self {
            name: name.into(),
            sets,
            reps_min,
            reps_max,
            progression: ProgressionScheme::default(),
            increment: 0.0,
            rpe_target: None,
            amrap_final_set: false,
            notes: String::new(),
        }
    }

    pub fn with_progression(mut self, scheme: ProgressionScheme, increment: f64) -> Self {
        self.progression = scheme;
        self.increment = increment;
        self
    }

    /// Normalized name used to match exercises across opinions
    pub fn key(&self) -> String {
        exercise_key(&self.name)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("exercise with empty name".to_string());
        }
        if self.sets == 0 {
            return Err(format!("{}: zero sets", self.name));
        }
        if self.reps_min == 0 || self.reps_min > self.reps_max {
            return Err(format!(
                "{}: invalid rep range {}-{}",
                self.name, self.reps_min, self.reps_max
            ));
        }
        if !self.increment.is_finite() || self.increment < 0.0 {
            return Err(format!("{}: invalid increment {}", self.name, self.increment));
        }
        Ok(())
    }
}

pub fn exercise_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDay {
    pub name: String,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub exercises: Vec<ExerciseSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramWeek {
    pub week_number: u32,
    #[serde(default)]
    pub deload: bool,
    pub days: Vec<ProgramDay>,
}

/// Weeks -> days -> exercises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramStructure {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub periodization: Periodization,
    pub weeks: Vec<ProgramWeek>,
}

impl ProgramStructure {
    /// Empty weeks of identical day templates
    pub fn skeleton(name: impl Into<String>, weeks: u32, day_focuses: &[String]) -> Self {
        let days: Vec<ProgramDay> = day_focuses
            .iter()
            .enumerate()
            .map(|(i, focus)| ProgramDay {
                name: format!("Day {}", i + 1),
                focus: focus.clone(),
                exercises: vec![],
            })
            .collect();

        Self {
            name: name.into(),
            description: String::new(),
            periodization: Periodization::None,
            weeks: (1..=weeks)
                .map(|n| ProgramWeek {
                    week_number: n,
                    deload: false,
                    days: days.clone(),
                })
                .collect(),
        }
    }

    /// Training days per week, taken from the first week
    pub fn days_per_week(&self) -> usize {
        self.weeks.first().map(|w| w.days.len()).unwrap_or(0)
    }

    /// Shape checks that hold for drafts as well as finished programs
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.weeks.is_empty() {
            return Err("program has no weeks".to_string());
        }
        let days = self.days_per_week();
        if days == 0 {
            return Err("program has no training days".to_string());
        }
        for (i, week) in self.weeks.iter().enumerate() {
            if week.days.len() != days {
                return Err(format!(
                    "week {} has {} days, expected {}",
                    week.week_number,
                    week.days.len(),
                    days
                ));
            }
            if week.week_number != i as u32 + 1 {
                return Err(format!(
                    "week numbers must run 1..{}, found {} at position {}",
                    self.weeks.len(),
                    week.week_number,
                    i + 1
                ));
            }
        }
        Ok(())
    }

    /// Full checks for a program handed to the renderer
    pub fn validate(&self) -> Result<(), String> {
        self.validate_shape()?;
        if self.name.trim().is_empty() {
            return Err("program has no name".to_string());
        }
        for week in &self.weeks {
            for day in &week.days {
                if day.exercises.is_empty() {
                    return Err(format!(
                        "week {} {} has no exercises",
                        week.week_number, day.name
                    ));
                }
                for exercise in &day.exercises {
                    exercise.validate()?;
                }
            }
        }
        Ok(())
    }

    pub fn exercise_count(&self) -> usize {
        self.weeks
            .first()
            .map(|w| w.days.iter().map(|d| d.exercises.len()).sum())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramFramework {
    pub split: SplitType,
    pub days_per_week: u32,
    pub day_focuses: Vec<String>,
    pub periodization: Periodization,
    pub progression_philosophy: String,
    pub deload_strategy: String,
    pub weeks: u32,
}

/// Where a revision starts. Weeks before `week`, and days before `day`
/// within it, have been trained and stay as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPoint {
    /// 1-based
    pub week: u32,
    /// 1-based
    #[serde(default = "RevisionPoint::first_day")]
    pub day: u32,
}

impl RevisionPoint {
    pub fn new(week: u32, day: u32) -> Self {
        Self { week, day }
    }

    fn first_day() -> u32 {
        1
    }

    pub fn check(&self, program: &ProgramStructure) -> Result<(), String> {
        let weeks = program.weeks.len() as u32;
        if self.week == 0 || self.week > weeks {
            return Err(format!(
                "week {} is outside the program's {} weeks",
                self.week, weeks
            ));
        }
        let days = program.days_per_week() as u32;
        if self.day == 0 || self.day > days {
            return Err(format!("day {} is outside 1..={}", self.day, days));
        }
        Ok(())
    }

    /// True for a day that was already trained
    pub fn is_frozen(&self, week_number: u32, day_index: usize) -> bool {
        week_number < self.week || (week_number == self.week && (day_index as u32) + 1 < self.day)
    }

    /// Week-level settings (deload) are open from the revision week on
    pub fn opens_week(&self, week_number: u32) -> bool {
        week_number >= self.week
    }

    pub fn describe(&self) -> String {
        format!("week {}, day {}", self.week, self.day)
    }

    /// Short account of the trained part, for specialists
    pub fn completed_summary(&self, program: &ProgramStructure) -> String {
        let mut lines = Vec::new();
        let full: Vec<&ProgramWeek> = program
            .weeks
            .iter()
            .filter(|w| w.week_number < self.week)
            .collect();
        if !full.is_empty() {
            lines.push(format!("Completed {} full weeks:", full.len()));
            for week in full {
                let deload = if week.deload { " (deload)" } else { "" };
                let days: Vec<&str> = week.days.iter().map(|d| d.name.as_str()).collect();
                lines.push(format!("  Week {}{}: {}", week.week_number, deload, days.join(", ")));
            }
        }
        if let Some(week) = program.weeks.iter().find(|w| w.week_number == self.week) {
            let done = week.days.iter().take(self.day.saturating_sub(1) as usize);
            for (i, day) in done.enumerate() {
                if i == 0 {
                    lines.push(format!("Week {} completed days:", self.week));
                }
                let names: Vec<&str> = day.exercises.iter().map(|e| e.name.as_str()).collect();
                lines.push(format!("  {}: {}", day.name, names.join(", ")));
            }
        }
        if lines.is_empty() {
            "No completed work".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Days that differ from `original` in the frozen part of `revised`
    pub fn frozen_changes(&self, original: &ProgramStructure, revised: &ProgramStructure) -> Vec<String> {
        let mut changed = Vec::new();
        for (before, after) in original.weeks.iter().zip(&revised.weeks) {
            for (i, (a, b)) in before.days.iter().zip(&after.days).enumerate() {
                if self.is_frozen(before.week_number, i) && a != b {
                    changed.push(format!("week {} {}", before.week_number, a.name));
                }
            }
            if !self.opens_week(before.week_number) && before.deload != after.deload {
                changed.push(format!("week {} deload flag", before.week_number));
            }
        }
        if revised.weeks.len() != original.weeks.len() {
            changed.push("week count".to_string());
        }
        changed
    }
}

/// The artifact every specialist evaluates: framework plus the structure so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDraft {
    pub framework: ProgramFramework,
    pub structure: ProgramStructure,
    /// Present when the draft seeds a refinement
    #[serde(default)]
    pub instruction: Option<String>,
    /// Set when only the part from this point on may change
    #[serde(default)]
    pub revision: Option<RevisionPoint>,
}

impl ProgramDraft {
    /// Draft built from a finished program, for refinement
    pub fn from_program(program: &ProgramStructure, instruction: impl Into<String>) -> Self {
        let day_focuses: Vec<String> = program
            .weeks
            .first()
            .map(|w| w.days.iter().map(|d| d.focus.clone()).collect())
            .unwrap_or_default();
        let days = day_focuses.len() as u32;
        let (split, _) = SplitType::for_days(days);

        Self {
            framework: ProgramFramework {
                split,
                days_per_week: days,
                day_focuses,
                periodization: program.periodization,
                progression_philosophy: "carried over from the previous iteration".to_string(),
                deload_strategy: program
                    .weeks
                    .iter()
                    .filter(|w| w.deload)
                    .map(|w| format!("week {}", w.week_number))
                    .collect::<Vec<_>>()
                    .join(", "),
                weeks: program.weeks.len() as u32,
            },
            structure: program.clone(),
            instruction: Some(instruction.into()),
            revision: None,
        }
    }
}

/// Output of the terminal task, handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalProgram {
    pub program: ProgramStructure,
    pub goals: String,
    pub rationale: String,
    /// Share of the roster that contributed an opinion
    pub confidence: f64,
    pub unavailable_specialists: Vec<SpecialistKind>,
    pub resolved_conflicts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squat() -> ExerciseSpec {
        ExerciseSpec::new("Squat", 5, 5, 5).with_progression(ProgressionScheme::Linear, 5.0)
    }

    #[test]
    fn test_split_for_days() {
        let (split, focuses) = SplitType::for_days(4);
        assert_eq!(split, SplitType::UpperLower);
        assert_eq!(focuses, vec!["Upper", "Lower", "Upper", "Lower"]);

        let (split, focuses) = SplitType::for_days(2);
        assert_eq!(split, SplitType::FullBody);
        assert_eq!(focuses.len(), 2);

        let (_, focuses) = SplitType::for_days(6);
        assert_eq!(focuses.last().map(String::as_str), Some("Legs"));
    }

    #[test]
    fn test_skeleton_shape() {
        let focuses = vec!["Upper".to_string(), "Lower".to_string()];
        let skeleton = ProgramStructure::skeleton("Draft", 3, &focuses);
        assert_eq!(skeleton.weeks.len(), 3);
        assert_eq!(skeleton.days_per_week(), 2);
        assert!(skeleton.validate_shape().is_ok());
        // Empty days are fine for a draft but not for a finished program
        assert!(skeleton.validate().is_err());
    }

    #[test]
    fn test_validate_catches_bad_volume() {
        let focuses = vec!["Full Body".to_string()];
        let mut program = ProgramStructure::skeleton("P", 1, &focuses);
        program.weeks[0].days[0].exercises.push(squat());
        assert!(program.validate().is_ok());

        program.weeks[0].days[0].exercises[0].reps_min = 8;
        program.weeks[0].days[0].exercises[0].reps_max = 6;
        assert!(program.validate().unwrap_err().contains("invalid rep range"));
    }

    #[test]
    fn test_progression_wire_names() {
        let json = serde_json::to_string(&ProgressionScheme::Linear).unwrap();
        assert_eq!(json, "\"lp\"");
        let parsed: ProgressionScheme = serde_json::from_str("\"sum\"").unwrap();
        assert_eq!(parsed, ProgressionScheme::Sum);
    }

    #[test]
    fn test_draft_from_program_marks_deloads() {
        let focuses = vec!["Upper".to_string(), "Lower".to_string()];
        let mut program = ProgramStructure::skeleton("P", 4, &focuses);
        program.weeks[3].deload = true;
        let draft = ProgramDraft::from_program(&program, "more arms");
        assert_eq!(draft.framework.days_per_week, 2);
        assert_eq!(draft.framework.deload_strategy, "week 4");
        assert_eq!(draft.instruction.as_deref(), Some("more arms"));
        assert_eq!(draft.revision, None);
    }

    #[test]
    fn test_revision_point_bounds() {
        let focuses = vec!["Upper".to_string(), "Lower".to_string()];
        let program = ProgramStructure::skeleton("P", 4, &focuses);

        assert!(RevisionPoint::new(1, 1).check(&program).is_ok());
        assert!(RevisionPoint::new(4, 2).check(&program).is_ok());
        assert!(RevisionPoint::new(0, 1).check(&program).is_err());
        assert!(RevisionPoint::new(5, 1).check(&program).is_err());
        assert!(RevisionPoint::new(2, 3).check(&program).is_err());
    }

    #[test]
    fn test_revision_point_freezes_trained_days() {
        let point = RevisionPoint::new(3, 2);
        assert!(point.is_frozen(1, 1));
        assert!(point.is_frozen(2, 0));
        assert!(point.is_frozen(3, 0));
        assert!(!point.is_frozen(3, 1));
        assert!(!point.is_frozen(4, 0));
        assert!(!point.opens_week(2));
        assert!(point.opens_week(3));
    }

    #[test]
    fn test_frozen_changes_and_summary() {
        let focuses = vec!["Upper".to_string(), "Lower".to_string()];
        let mut original = ProgramStructure::skeleton("P", 3, &focuses);
        for week in &mut original.weeks {
            week.days[0].exercises.push(squat());
        }
        let point = RevisionPoint::new(2, 2);

        let mut revised = original.clone();
        revised.weeks[1].days[1].exercises.push(squat());
        revised.weeks[2].deload = true;
        assert!(point.frozen_changes(&original, &revised).is_empty());

        revised.weeks[1].days[0].exercises.clear();
        assert_eq!(point.frozen_changes(&original, &revised), vec!["week 2 Day 1"]);

        let summary = point.completed_summary(&original);
        assert!(summary.contains("Completed 1 full weeks"));
        assert!(summary.contains("Week 2 completed days"));
        assert!(summary.contains("Day 1: Squat"));
    }
}
