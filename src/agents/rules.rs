//! Deterministic offline evaluator.
//!
//! Stands in for the language-model agents: same contracts, no network. Each
//! specialist only looks at its own focus, so the roster disagrees in
//! predictable places (volume, progression, deload placement).

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::Evaluator;
use crate::dag::{TaskInput, TaskOutput, TaskRole};
use crate::deliberation::{Adjustment, Opinion, Proposal, SpecialistKind};
use crate::error::EvaluatorError;
use crate::model::exercises::{self, CatalogExercise};
use crate::model::{
    ExerciseSpec, ExperienceLevel, Periodization, ProgramDraft, ProgramFramework,
    ProgramStructure, ProgressionScheme, RecoveryCapacity, Severity, SplitType, UserAnalysis,
    UserProfile,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Evaluator for RuleEvaluator {
    async fn invoke(&self, input: &TaskInput) -> Result<TaskOutput, EvaluatorError> {
        match input.role {
            TaskRole::UserAnalysis => Ok(TaskOutput::UserAnalysis(analyze_user(
                &input.run.profile,
                &input.run.goals.text,
            ))),
            TaskRole::FrameworkDesign => design_framework(input).map(TaskOutput::Draft),
            TaskRole::Specialist { kind, .. } => {
                let draft = input.draft().ok_or_else(|| {
                    EvaluatorError::ContractViolation("specialist input has no draft".to_string())
                })?;
                Ok(TaskOutput::Opinion(specialist_opinion(kind, input, draft)))
            }
            role => Err(EvaluatorError::ContractViolation(format!(
                "{} is not an external role",
                role.slug()
            ))),
        }
    }
}

pub(crate) fn recovery_capacity(profile: &UserProfile) -> RecoveryCapacity {
    let severe = profile
        .limitations
        .iter()
        .any(|l| l.severity == Severity::Severe);
    let older = profile.age.map(|a| a >= 50).unwrap_or(false);

    if severe || older || (profile.schedule_days >= 6 && profile.experience_level == ExperienceLevel::Beginner) {
        RecoveryCapacity::Low
    } else if profile.experience_level == ExperienceLevel::Advanced && profile.limitations.is_empty()
    {
        RecoveryCapacity::High
    } else {
        RecoveryCapacity::Moderate
    }
}

fn analyze_user(profile: &UserProfile, goal_text: &str) -> UserAnalysis {
    let mut primary_goals: Vec<String> = profile.goals.iter().map(|g| g.as_str().to_string()).collect();
    if primary_goals.is_empty() {
        primary_goals.push(goal_text.trim().to_string());
    }

    let capacity = recovery_capacity(profile);
    let mut recommendations = Vec::new();
    match profile.experience_level {
        ExperienceLevel::Beginner => {
            recommendations.push("prioritise technique on the main compounds".to_string())
        }
        ExperienceLevel::Intermediate => {
            recommendations.push("vary intensity across the week".to_string())
        }
        ExperienceLevel::Advanced => {
            recommendations.push("organise training in focused blocks".to_string())
        }
    }
    if capacity == RecoveryCapacity::Low {
        recommendations.push("schedule frequent deloads".to_string());
    }
    if profile.session_duration < 45 {
        recommendations.push("keep sessions to a few key movements".to_string());
    }

    UserAnalysis {
        experience_assessment: profile.experience_level,
        primary_goals,
        days_per_week: profile.schedule_days,
        session_duration: profile.session_duration,
        recovery_capacity: capacity,
        limitations: profile
            .limitations
            .iter()
            .map(|l| l.description.clone())
            .collect(),
        recommendations,
    }
}

fn periodization_for(level: ExperienceLevel) -> Periodization {
    match level {
        ExperienceLevel::Beginner => Periodization::Linear,
        ExperienceLevel::Intermediate => Periodization::Undulating,
        ExperienceLevel::Advanced => Periodization::Block,
    }
}

fn split_label(split: SplitType) -> &'static str {
    match split {
        SplitType::FullBody => "Full Body",
        SplitType::UpperLower => "Upper/Lower",
        SplitType::PushPullLegs => "Push/Pull/Legs",
    }
}

/// Framework plus a skeleton with one baseline compound per trained region
fn design_framework(input: &TaskInput) -> Result<ProgramDraft, EvaluatorError> {
    let analysis = input.user_analysis().ok_or_else(|| {
        EvaluatorError::ContractViolation("framework input has no user analysis".to_string())
    })?;
    let inventory = &input.run.equipment;
    let weeks = input.run.goals.weeks;
    let (split, focuses) = SplitType::for_days(analysis.days_per_week);
    let periodization = periodization_for(analysis.experience_assessment);

    let mut structure = ProgramStructure::skeleton(
        format!("{} {}-Week Program", split_label(split), weeks),
        weeks,
        &focuses,
    );
    structure.description = input.run.goals.text.clone();
    structure.periodization = periodization;

    let increment = inventory.min_increment();
    let mut day_templates = Vec::with_capacity(focuses.len());
    for (i, focus) in focuses.iter().enumerate() {
        // Repeated focuses rotate through the candidate list
        let occurrence = focuses[..i].iter().filter(|f| *f == focus).count();
        let mut day = Vec::new();
        for region in exercises::regions_for_focus(focus) {
            let options: Vec<&CatalogExercise> = exercises::candidates(focus, inventory, &[], true)
                .into_iter()
                .filter(|e| e.region == region)
                .collect();
            if options.is_empty() {
                continue;
            }
            let pick = options[occurrence % options.len()];
            day.push(
                ExerciseSpec::new(pick.name, 3, 6, 10)
                    .with_progression(ProgressionScheme::Double, increment),
            );
        }
        day_templates.push(day);
    }
    for week in &mut structure.weeks {
        for (day, template) in week.days.iter_mut().zip(&day_templates) {
            day.exercises = template.clone();
        }
    }

    Ok(ProgramDraft {
        framework: ProgramFramework {
            split,
            days_per_week: focuses.len() as u32,
            day_focuses: focuses,
            periodization,
            progression_philosophy: match analysis.experience_assessment {
                ExperienceLevel::Beginner => "add load every session while reps hold".to_string(),
                _ => "add load once the top of the rep range is reached".to_string(),
            },
            deload_strategy: if weeks >= 4 {
                "deload every fourth week".to_string()
            } else {
                "no scheduled deload in a short block".to_string()
            },
            weeks,
        },
        structure,
        instruction: None,
        revision: None,
    })
}

/// Names in the first week, per day
fn day_exercises(draft: &ProgramDraft) -> Vec<Vec<String>> {
    draft
        .structure
        .weeks
        .first()
        .map(|w| {
            w.days
                .iter()
                .map(|d| d.exercises.iter().map(|e| e.name.clone()).collect())
                .collect()
        })
        .unwrap_or_default()
}

fn is_compound(name: &str) -> bool {
    exercises::find(name).map(|e| e.compound).unwrap_or(true)
}

fn is_lower_body(name: &str) -> bool {
    exercises::find(name)
        .map(|e| e.region == exercises::BodyRegion::Legs)
        .unwrap_or(false)
}

fn instruction(input: &TaskInput, draft: &ProgramDraft) -> String {
    draft
        .instruction
        .clone()
        .or_else(|| input.run.instruction.clone())
        .unwrap_or_default()
        .to_lowercase()
}

fn specialist_opinion(kind: SpecialistKind, input: &TaskInput, draft: &ProgramDraft) -> Opinion {
    let proposals = match kind {
        SpecialistKind::StrengthCoach => strength_coach(input, draft),
        SpecialistKind::HypertrophyExpert => hypertrophy_expert(input, draft),
        SpecialistKind::PeriodizationSpecialist => periodization_specialist(input, draft),
        SpecialistKind::RecoveryAnalyst => recovery_analyst(input, draft),
    };
    Opinion {
        specialist: kind,
        summary: format!("{} proposals on {}", proposals.len(), kind.focus()),
        proposals,
    }
}

fn strength_coach(input: &TaskInput, draft: &ProgramDraft) -> Vec<Proposal> {
    let base = input.run.equipment.min_increment();
    let mut proposals = Vec::new();
    let mut progressed = BTreeSet::new();

    for (day, names) in day_exercises(draft).iter().enumerate() {
        for name in names.iter().filter(|n| is_compound(n)) {
            proposals.push(Proposal::new(
                Adjustment::SetVolume {
                    day,
                    name: name.clone(),
                    sets: 5,
                    reps_min: 3,
                    reps_max: 5,
                },
                "heavy low-rep sets build maximal strength",
            ));
            if progressed.insert(name.clone()) {
                let increment = if is_lower_body(name) { base * 2.0 } else { base };
                proposals.push(Proposal::new(
                    Adjustment::SetProgression {
                        name: name.clone(),
                        scheme: ProgressionScheme::Linear,
                        increment,
                    },
                    "linear loading while the lifter can recover session to session",
                ));
            }
        }
    }
    proposals
}

fn hypertrophy_expert(input: &TaskInput, draft: &ProgramDraft) -> Vec<Proposal> {
    let inventory = &input.run.equipment;
    let restricted = input.run.profile.restricted_exercises();
    let instruction = instruction(input, draft);
    let sets = if instruction.contains("less volume") || instruction.contains("fewer sets") {
        3
    } else if instruction.contains("more volume") {
        5
    } else {
        4
    };

    let mut proposals = Vec::new();
    let mut progressed = BTreeSet::new();
    let days = day_exercises(draft);

    for (day, names) in days.iter().enumerate() {
        for name in names.iter().filter(|n| is_compound(n)) {
            proposals.push(Proposal::new(
                Adjustment::SetVolume {
                    day,
                    name: name.clone(),
                    sets,
                    reps_min: 8,
                    reps_max: 12,
                },
                "moderate reps accumulate more productive volume",
            ));
            if progressed.insert(name.clone()) {
                proposals.push(Proposal::new(
                    Adjustment::SetProgression {
                        name: name.clone(),
                        scheme: ProgressionScheme::Double,
                        increment: inventory.min_increment(),
                    },
                    "double progression keeps reps in the growth range",
                ));
            }
        }

        let focus = draft
            .framework
            .day_focuses
            .get(day)
            .map(String::as_str)
            .unwrap_or("Full Body");
        let isolation = exercises::candidates(focus, inventory, &restricted, false)
            .into_iter()
            .find(|e| !names.iter().any(|n| n.eq_ignore_ascii_case(e.name)));
        if let Some(accessory) = isolation {
            proposals.push(Proposal::new(
                Adjustment::AddExercise {
                    day,
                    exercise: ExerciseSpec::new(accessory.name, 3, 10, 15)
                        .with_progression(ProgressionScheme::Double, inventory.min_increment()),
                },
                "an isolation movement adds volume without much fatigue",
            ));
        }
    }
    proposals
}

fn periodization_specialist(input: &TaskInput, draft: &ProgramDraft) -> Vec<Proposal> {
    let level = input.run.profile.experience_level;
    let weeks = draft.structure.weeks.len() as u32;
    let deloads: Vec<u32> = (1..=weeks).filter(|w| w % 4 == 0).collect();

    vec![
        Proposal::new(
            Adjustment::SetPeriodization {
                periodization: periodization_for(level),
            },
            format!("{} lifters respond best to this model", level.as_str()),
        ),
        Proposal::new(
            Adjustment::SetDeloadWeeks { weeks: deloads },
            "deload every fourth week to dissipate fatigue",
        ),
    ]
}

fn recovery_analyst(input: &TaskInput, draft: &ProgramDraft) -> Vec<Proposal> {
    let profile = &input.run.profile;
    let inventory = &input.run.equipment;
    let restricted = profile.restricted_exercises();
    let instruction = instruction(input, draft);
    let mut proposals = Vec::new();

    for (day, names) in day_exercises(draft).iter().enumerate() {
        let focus = draft
            .framework
            .day_focuses
            .get(day)
            .map(String::as_str)
            .unwrap_or("Full Body");
        for name in names {
            if !restricted.contains(&name.to_lowercase()) {
                continue;
            }
            proposals.push(Proposal::new(
                Adjustment::RemoveExercise {
                    day,
                    name: name.clone(),
                },
                format!("{} aggravates a reported limitation", name),
            ));

            // Same region, same movement pattern when the catalog allows
            let original = exercises::find(name);
            let options: Vec<&CatalogExercise> =
                exercises::candidates(focus, inventory, &restricted, true)
                    .into_iter()
                    .filter(|e| original.map(|o| e.region == o.region).unwrap_or(true))
                    .filter(|e| !names.iter().any(|n| n.eq_ignore_ascii_case(e.name)))
                    .collect();
            let substitute = options
                .iter()
                .find(|e| original.map(|o| e.pattern == o.pattern).unwrap_or(false))
                .or_else(|| options.first())
                .copied();
            if let Some(sub) = substitute {
                proposals.push(Proposal::new(
                    Adjustment::AddExercise {
                        day,
                        exercise: ExerciseSpec::new(sub.name, 3, 8, 12)
                            .with_progression(ProgressionScheme::Double, inventory.min_increment()),
                    },
                    format!("{} trains the same region without the aggravating pattern", sub.name),
                ));
            }
        }
    }

    let weeks = draft.structure.weeks.len() as u32;
    let wants_rest = instruction.contains("deload") || instruction.contains("recover");
    if (recovery_capacity(profile) == RecoveryCapacity::Low || wants_rest) && weeks >= 3 {
        proposals.push(Proposal::new(
            Adjustment::SetDeloadWeeks {
                weeks: (1..=weeks).filter(|w| w % 3 == 0).collect(),
            },
            "limited recovery capacity calls for a deload every third week",
        ));
    }
    proposals
}
