//! Local-compute task bodies and output contracts.
//!
//! Everything here is synchronous and does no I/O, so it can run inline inside
//! a phase.

use crate::dag::{TaskInput, TaskOutput, TaskRole};
use crate::deliberation::{Adjustment, Arbiter};
use crate::error::Error;
use crate::model::exercises;
use crate::model::{
    EquipmentAssessment, EquipmentType, FinalProgram, GymType, ProgramDraft, RefinementBrief,
};

/// Keywords a refinement instruction is scanned for
const EMPHASIS_KEYWORDS: &[&str] = &[
    "volume",
    "intensity",
    "strength",
    "hypertrophy",
    "deload",
    "recovery",
    "periodization",
    "progression",
    "shoulder",
    "knee",
    "back",
    "arms",
    "legs",
    "shorter",
    "longer",
];

/// Run a local-compute role
pub fn run_local(arbiter: &Arbiter, input: &TaskInput) -> Result<TaskOutput, Error> {
    match input.role {
        TaskRole::EquipmentAssessment => Ok(TaskOutput::EquipmentAssessment(
            assess_equipment(input),
        )),
        TaskRole::RefinementIntake => refinement_intake(input).map(TaskOutput::Brief),
        TaskRole::ProgramSeed => seed_program(input).map(TaskOutput::Draft),
        TaskRole::Arbiter => {
            let deliberation = input.deliberation.as_ref().ok_or_else(|| Error::TaskContract {
                task_id: input.task_id.clone(),
                reason: "arbiter started without deliberation entries".to_string(),
            })?;
            arbiter
                .arbitrate(&input.task_id, deliberation)
                .map(TaskOutput::Arbitration)
        }
        TaskRole::Finalize => finalize(input).map(TaskOutput::Program),
        role => Err(Error::TaskContract {
            task_id: input.task_id.clone(),
            reason: format!("{} is not a local-compute role", role.slug()),
        }),
    }
}

pub fn assess_equipment(input: &TaskInput) -> EquipmentAssessment {
    let inventory = &input.run.equipment;
    let restricted = input.run.profile.restricted_exercises();

    let names = |compound: bool| -> Vec<String> {
        exercises::candidates("Full Body", inventory, &restricted, compound)
            .iter()
            .map(|e| e.name.to_string())
            .collect()
    };

    let gym_type = if inventory.has(EquipmentType::Machine) && inventory.has(EquipmentType::Cable) {
        GymType::Commercial
    } else if inventory.has_plate_loaded() {
        GymType::HomeBarbell
    } else if inventory.has(EquipmentType::Dumbbell) || inventory.has(EquipmentType::Kettlebell) {
        GymType::HomeDumbbell
    } else {
        GymType::Minimal
    };

    let mut limitations = Vec::new();
    if !inventory.has_plate_loaded() {
        limitations.push("no plate-loaded bar: heavy compound loading is limited".to_string());
    }
    if let Some(max) = inventory.dumbbell_max {
        limitations.push(format!(
            "dumbbells top out at {}{}",
            max,
            inventory.unit.as_str()
        ));
    }
    if !inventory.has(EquipmentType::Cable) && !inventory.has(EquipmentType::Machine) {
        limitations.push("no cables or machines for isolation work".to_string());
    }

    EquipmentAssessment {
        gym_type,
        compound_movements: names(true),
        isolation_movements: names(false),
        equipment_limitations: limitations,
        min_increment: inventory.min_increment(),
        unit: inventory.unit,
    }
}

pub fn refinement_intake(input: &TaskInput) -> Result<RefinementBrief, Error> {
    let instruction = input
        .run
        .instruction
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::TaskContract {
            task_id: input.task_id.clone(),
            reason: "refinement run has no instruction".to_string(),
        })?;

    let lowered = instruction.to_lowercase();
    let emphasis = EMPHASIS_KEYWORDS
        .iter()
        .filter(|k| lowered.contains(*k))
        .map(|k| k.to_string())
        .collect();

    Ok(RefinementBrief {
        instruction: instruction.to_string(),
        emphasis,
    })
}

/// The prior program, unchanged, becomes the draft the roster deliberates over
pub fn seed_program(input: &TaskInput) -> Result<ProgramDraft, Error> {
    let prior = input.run.prior_program.as_ref().ok_or_else(|| Error::TaskContract {
        task_id: input.task_id.clone(),
        reason: "refinement run has no prior program".to_string(),
    })?;
    let instruction = input
        .brief()
        .map(|b| b.instruction.clone())
        .or_else(|| input.run.instruction.clone())
        .unwrap_or_default();

    let mut draft = ProgramDraft::from_program(&prior.program, instruction);
    draft.revision = input.run.revision;
    Ok(draft)
}

/// Terminal validation: never hand a malformed program to the renderer
pub fn finalize(input: &TaskInput) -> Result<FinalProgram, Error> {
    let contract = |reason: String| Error::TaskContract {
        task_id: input.task_id.clone(),
        reason,
    };
    let arbitration = input
        .arbitration()
        .ok_or_else(|| contract("no arbitration upstream".to_string()))?;

    let mut program = arbitration.program.clone();
    program.validate().map_err(contract)?;
    if program.description.is_empty() {
        program.description = input.run.goals.text.clone();
    }

    Ok(FinalProgram {
        program,
        goals: input.run.goals.text.clone(),
        rationale: arbitration.rationale.clone(),
        confidence: arbitration.confidence,
        unavailable_specialists: arbitration.unavailable.clone(),
        resolved_conflicts: arbitration.resolutions.len(),
    })
}

/// Check an output against its role's contract; a mismatch is never retried
pub fn check_contract(input: &TaskInput, output: &TaskOutput) -> Result<(), String> {
    let expected = TaskOutput::expected_for(&input.role);
    if output.name() != expected {
        return Err(format!("expected {} output, got {}", expected, output.name()));
    }

    match (&input.role, output) {
        (TaskRole::UserAnalysis, TaskOutput::UserAnalysis(analysis)) => {
            if !(1..=7).contains(&analysis.days_per_week) {
                return Err(format!(
                    "days_per_week must be 1-7, got {}",
                    analysis.days_per_week
                ));
            }
        }
        (TaskRole::FrameworkDesign, TaskOutput::Draft(draft))
        | (TaskRole::ProgramSeed, TaskOutput::Draft(draft)) => {
            draft.structure.validate_shape()?;
            if draft.framework.days_per_week as usize != draft.structure.days_per_week() {
                return Err(format!(
                    "framework has {} days but structure has {}",
                    draft.framework.days_per_week,
                    draft.structure.days_per_week()
                ));
            }
            if draft.framework.weeks as usize != draft.structure.weeks.len() {
                return Err(format!(
                    "framework has {} weeks but structure has {}",
                    draft.framework.weeks,
                    draft.structure.weeks.len()
                ));
            }
            if let Some(point) = draft.revision {
                point.check(&draft.structure)?;
            }
        }
        (TaskRole::Arbiter, TaskOutput::Arbitration(arbitration)) => {
            let Some(deliberation) = &input.deliberation else {
                return Ok(());
            };
            if let Some(point) = deliberation.draft.revision {
                let changed = point.frozen_changes(&deliberation.draft.structure, &arbitration.program);
                if !changed.is_empty() {
                    return Err(format!(
                        "revision from {} changed trained sessions: {}",
                        point.describe(),
                        changed.join(", ")
                    ));
                }
            }
        }
        (TaskRole::Specialist { kind, .. }, TaskOutput::Opinion(opinion)) => {
            if opinion.specialist != *kind {
                return Err(format!(
                    "opinion signed by {} for a {} task",
                    opinion.specialist, kind
                ));
            }
            let Some(draft) = input.draft() else {
                return Err("specialist ran without a draft".to_string());
            };
            let days = draft.structure.days_per_week();
            let weeks = draft.structure.weeks.len() as u32;
            for proposal in &opinion.proposals {
                check_adjustment(&proposal.adjustment, days, weeks)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_adjustment(adjustment: &Adjustment, days: usize, weeks: u32) -> Result<(), String> {
    if let Some(day) = adjustment.day() {
        if day >= days {
            return Err(format!(
                "{} targets day {} of {}",
                adjustment.describe(),
                day + 1,
                days
            ));
        }
    }
    match adjustment {
        Adjustment::AddExercise { exercise, .. } => exercise.validate(),
        Adjustment::SetVolume {
            name,
            sets,
            reps_min,
            reps_max,
            ..
        } => {
            if *sets == 0 || *reps_min == 0 || reps_min > reps_max {
                Err(format!("{}: invalid volume {}x{}-{}", name, sets, reps_min, reps_max))
            } else {
                Ok(())
            }
        }
        Adjustment::SetProgression { name, increment, .. } => {
            if increment.is_finite() && *increment >= 0.0 {
                Ok(())
            } else {
                Err(format!("{}: invalid increment {}", name, increment))
            }
        }
        Adjustment::SetDeloadWeeks { weeks: deloads } => {
            match deloads.iter().find(|w| **w == 0 || **w > weeks) {
                Some(w) => Err(format!("deload week {} outside 1..={}", w, weeks)),
                None => Ok(()),
            }
        }
        Adjustment::RemoveExercise { .. } | Adjustment::SetPeriodization { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::dag::RunInputs;
    use crate::deliberation::{Opinion, Proposal, SpecialistKind};
    use crate::model::{
        EquipmentInventory, ExerciseSpec, ExperienceLevel, GoalStatement, Periodization,
        ProgramFramework, ProgramStructure, SplitType, UserProfile,
    };

    fn run_inputs(equipment: Vec<EquipmentType>) -> Arc<RunInputs> {
        Arc::new(RunInputs::new(
            UserProfile {
                name: "Lee".into(),
                experience_level: ExperienceLevel::Intermediate,
                goals: vec![],
                schedule_days: 2,
                session_duration: 60,
                strength_levels: vec![],
                limitations: vec![],
                age: None,
                body_weight: None,
                notes: String::new(),
            },
            GoalStatement::new("build muscle").with_weeks(2),
            EquipmentInventory::new(equipment),
        ))
    }

    fn draft() -> ProgramDraft {
        let focuses = vec!["Upper".to_string(), "Lower".to_string()];
        ProgramDraft {
            framework: ProgramFramework {
                split: SplitType::UpperLower,
                days_per_week: 2,
                day_focuses: focuses.clone(),
                periodization: Periodization::Undulating,
                progression_philosophy: String::new(),
                deload_strategy: String::new(),
                weeks: 2,
            },
            structure: ProgramStructure::skeleton("Draft", 2, &focuses),
            instruction: None,
            revision: None,
        }
    }

    fn input(role: TaskRole, upstream: Vec<(&str, TaskOutput)>) -> TaskInput {
        TaskInput {
            task_id: "t".into(),
            role,
            attempt: 1,
            run: run_inputs(vec![EquipmentType::Dumbbell]),
            upstream: upstream
                .into_iter()
                .map(|(id, o)| (id.to_string(), o))
                .collect::<BTreeMap<_, _>>(),
            deliberation: None,
        }
    }

    #[test]
    fn test_equipment_assessment_dumbbell_gym() {
        let assessment = assess_equipment(&input(TaskRole::EquipmentAssessment, vec![]));
        assert_eq!(assessment.gym_type, GymType::HomeDumbbell);
        assert!(assessment.compound_movements.contains(&"Goblet Squat".to_string()));
        assert!(!assessment.compound_movements.contains(&"Squat".to_string()));
        assert_eq!(assessment.min_increment, 2.5);
    }

    #[test]
    fn test_specialist_contract() {
        let role = TaskRole::Specialist {
            kind: SpecialistKind::StrengthCoach,
            position: 0,
        };
        let task = input(role, vec![("framework", TaskOutput::Draft(draft()))]);

        let good = TaskOutput::Opinion(Opinion {
            specialist: SpecialistKind::StrengthCoach,
            summary: String::new(),
            proposals: vec![Proposal::new(
                Adjustment::AddExercise {
                    day: 1,
                    exercise: ExerciseSpec::new("Goblet Squat", 3, 8, 12),
                },
                "legs",
            )],
        });
        assert!(check_contract(&task, &good).is_ok());

        let out_of_range = TaskOutput::Opinion(Opinion {
            specialist: SpecialistKind::StrengthCoach,
            summary: String::new(),
            proposals: vec![Proposal::new(
                Adjustment::SetDeloadWeeks { weeks: vec![3] },
                "too late",
            )],
        });
        assert!(check_contract(&task, &out_of_range).is_err());

        let wrong_signer = TaskOutput::Opinion(Opinion {
            specialist: SpecialistKind::RecoveryAnalyst,
            summary: String::new(),
            proposals: vec![],
        });
        assert!(check_contract(&task, &wrong_signer).unwrap_err().contains("signed by"));

        let wrong_variant = TaskOutput::Draft(draft());
        assert!(check_contract(&task, &wrong_variant).is_err());
    }

    #[test]
    fn test_finalize_rejects_empty_days() {
        let arbitration = crate::deliberation::Arbitration {
            program: draft().structure,
            applied: vec![],
            resolutions: vec![],
            rationale: String::new(),
            confidence: 1.0,
            unavailable: vec![],
            policy: "majority".into(),
        };
        let task = input(
            TaskRole::Finalize,
            vec![("arbiter", TaskOutput::Arbitration(arbitration))],
        );
        assert!(matches!(finalize(&task), Err(Error::TaskContract { .. })));
    }

    #[test]
    fn test_revision_seed_and_arbiter_contract() {
        let mut structure = draft().structure;
        for week in &mut structure.weeks {
            for day in &mut week.days {
                day.exercises.push(ExerciseSpec::new("Goblet Squat", 3, 8, 12));
            }
        }
        let prior = FinalProgram {
            program: structure,
            goals: "build muscle".into(),
            rationale: String::new(),
            confidence: 1.0,
            unavailable_specialists: vec![],
            resolved_conflicts: 0,
        };
        let point = crate::model::RevisionPoint::new(2, 1);

        let mut seed = input(TaskRole::ProgramSeed, vec![]);
        let run = (*seed.run)
            .clone()
            .refinement(prior.clone(), "knee is sore")
            .revising_from(point);
        seed.run = Arc::new(run);
        let seeded = seed_program(&seed).unwrap();
        assert_eq!(seeded.revision, Some(point));
        assert!(check_contract(&seed, &TaskOutput::Draft(seeded.clone())).is_ok());

        let mut past_end = seeded.clone();
        past_end.revision = Some(crate::model::RevisionPoint::new(3, 1));
        assert!(check_contract(&seed, &TaskOutput::Draft(past_end)).is_err());

        let arbitration = |program: ProgramStructure| {
            TaskOutput::Arbitration(crate::deliberation::Arbitration {
                program,
                applied: vec![],
                resolutions: vec![],
                rationale: String::new(),
                confidence: 1.0,
                unavailable: vec![],
                policy: "majority".into(),
            })
        };
        let mut arbiter = input(TaskRole::Arbiter, vec![]);
        arbiter.deliberation = Some(crate::deliberation::ArbiterInput {
            draft: seeded.clone(),
            entries: vec![],
        });

        let mut open_change = seeded.structure.clone();
        open_change.weeks[1].days[0].exercises[0].sets = 5;
        assert!(check_contract(&arbiter, &arbitration(open_change)).is_ok());

        let mut frozen_change = seeded.structure.clone();
        frozen_change.weeks[0].days[1].exercises.clear();
        let err = check_contract(&arbiter, &arbitration(frozen_change)).unwrap_err();
        assert!(err.contains("week 1 Day 2"), "{}", err);
    }

    #[test]
    fn test_refinement_intake_emphasis() {
        let mut task = input(TaskRole::RefinementIntake, vec![]);
        let mut run = (*task.run).clone();
        run.instruction = Some("Less volume, my shoulder hurts".into());
        task.run = Arc::new(run);

        let brief = refinement_intake(&task).unwrap();
        assert!(brief.mentions("volume"));
        assert!(brief.mentions("shoulder"));
        assert!(!brief.mentions("deload"));
    }
}
