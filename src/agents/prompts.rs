//! Prompt text for the CLI-backed evaluator.

use crate::dag::{TaskInput, TaskRole};
use crate::deliberation::SpecialistKind;
use crate::model::exercises;

const JSON_ONLY: &str = "Respond with a single JSON object and nothing else. No markdown fences.";

const ADJUSTMENT_FORMAT: &str = r#"Each proposal is {"adjustment": {...}, "rationale": "..."} where adjustment is one of:
  {"op": "add_exercise", "day": 0, "exercise": {"name": "...", "sets": 3, "reps_min": 8, "reps_max": 12, "progression": "dp", "increment": 5.0}}
  {"op": "remove_exercise", "day": 0, "name": "..."}
  {"op": "set_volume", "day": 0, "name": "...", "sets": 4, "reps_min": 6, "reps_max": 8}
  {"op": "set_progression", "name": "...", "scheme": "lp" | "dp" | "sum", "increment": 5.0}
  {"op": "set_deload_weeks", "weeks": [4]}
  {"op": "set_periodization", "periodization": "linear" | "undulating" | "block" | "none"}
Days are 0-based indexes into the week; weeks are 1-based."#;

fn specialist_system(kind: SpecialistKind) -> String {
    let principles = match kind {
        SpecialistKind::StrengthCoach => {
            "Compound lifts form the foundation. Progressive overload drives strength. \
             Heavy sets stay in the 3-6 rep range and technique comes before load."
        }
        SpecialistKind::HypertrophyExpert => {
            "Volume drives growth within recovery capacity. Compounds sit at 6-12 reps and \
             isolation work at 8-15. Every muscle group gets direct work."
        }
        SpecialistKind::PeriodizationSpecialist => {
            "Training is organised in phases with specific goals. Fatigue accumulates and is \
             dissipated with planned deloads. The model depends on training age."
        }
        SpecialistKind::RecoveryAnalyst => {
            "Injuries and limitations come first. Session length and weekly load must fit \
             the lifter's recovery capacity. Swap aggravating movements for safe ones."
        }
    };
    format!(
        "You are a {} reviewing a draft strength training program.\n\
         Your focus: {}.\n{}\n\
         Only propose changes inside your focus. Other specialists cover the rest.",
        kind.display_name(),
        kind.focus(),
        principles
    )
}

pub(crate) fn system_prompt(role: &TaskRole) -> String {
    match role {
        TaskRole::UserAnalysis => "You are an experienced strength coach assessing a new \
            client. Judge their real training age, goals, schedule and recovery capacity."
            .to_string(),
        TaskRole::FrameworkDesign => "You are a program designer. Choose a split, \
            periodization model and progression philosophy, then lay out every training day \
            with its baseline exercises."
            .to_string(),
        TaskRole::Specialist { kind, .. } => specialist_system(*kind),
        other => format!("You are handling the {} step of program generation.", other.slug()),
    }
}

fn equipment_constraints(input: &TaskInput) -> String {
    let inventory = &input.run.equipment;
    let names: Vec<&str> = exercises::catalog()
        .iter()
        .filter(|e| e.available_with(inventory))
        .map(|e| e.name)
        .collect();
    let mut lines = vec![inventory.summary()];
    lines.push(format!("Available exercises: {}", names.join(", ")));
    lines.push(format!(
        "Minimum weight increment: {}{}",
        inventory.min_increment(),
        inventory.unit.as_str()
    ));
    lines.push("Only use exercises from the available list.".to_string());
    lines.join("\n")
}

pub(crate) fn task_prompt(input: &TaskInput) -> String {
    let run = &input.run;
    let mut sections = vec![
        format!("## Goals\n{} ({} weeks)", run.goals.text, run.goals.weeks),
        format!("## Profile\n{}", run.profile.summary()),
        format!("## Equipment\n{}", equipment_constraints(input)),
    ];

    match &input.role {
        TaskRole::UserAnalysis => sections.push(
            r#"## Output
{"experience_assessment": "beginner" | "intermediate" | "advanced",
 "primary_goals": ["..."], "days_per_week": 3, "session_duration": 60,
 "recovery_capacity": "low" | "moderate" | "high",
 "limitations": ["..."], "recommendations": ["..."]}"#
                .to_string(),
        ),
        TaskRole::FrameworkDesign => {
            if let Some(analysis) = input.user_analysis() {
                sections.push(format!(
                    "## Analysis\n{}",
                    serde_json::to_string_pretty(analysis).unwrap_or_default()
                ));
            }
            sections.push(
                r#"## Output
{"framework": {"split": "full_body" | "upper_lower" | "push_pull_legs", "days_per_week": 3,
   "day_focuses": ["..."], "periodization": "linear", "progression_philosophy": "...",
   "deload_strategy": "...", "weeks": 4},
 "structure": {"name": "...", "description": "...", "periodization": "linear",
   "weeks": [{"week_number": 1, "deload": false, "days": [{"name": "Day 1", "focus": "...",
     "exercises": [{"name": "...", "sets": 3, "reps_min": 6, "reps_max": 10, "progression": "dp", "increment": 5.0}]}]}]}}
Every week must have the same days as day_focuses, and every day needs at least one exercise."#
                    .to_string(),
            );
        }
        TaskRole::Specialist { .. } => {
            if let Some(draft) = input.draft() {
                if let Some(instruction) = &draft.instruction {
                    sections.push(format!("## Requested change\n{}", instruction));
                }
                if let Some(point) = draft.revision {
                    sections.push(format!(
                        "## Revision\nRevise from {}. Sessions before it were already trained and \
                         will not change.\n{}",
                        point.describe(),
                        point.completed_summary(&draft.structure)
                    ));
                }
                sections.push(format!(
                    "## Draft\n{}",
                    serde_json::to_string_pretty(&draft.structure).unwrap_or_default()
                ));
            }
            sections.push(format!(
                "## Output\n{{\"summary\": \"...\", \"proposals\": [...]}}\n{}",
                ADJUSTMENT_FORMAT
            ));
        }
        _ => {}
    }

    sections.push(JSON_ONLY.to_string());
    sections.join("\n\n")
}
