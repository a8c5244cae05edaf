use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::opinion::{Adjustment, AdjustmentKey, Opinion, SpecialistKind};
use super::policy::{ArbitrationPolicy, Candidate, Supporter};
use crate::error::Error;
use crate::model::{exercise_key, ProgramDraft, ProgramStructure, RevisionPoint};

/// One roster slot as the arbiter sees it; never omitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpecialistEntry {
    Available {
        position: usize,
        kind: SpecialistKind,
        opinion: Opinion,
    },
    Unavailable {
        position: usize,
        kind: SpecialistKind,
        reason: String,
    },
}

impl SpecialistEntry {
    pub fn position(&self) -> usize {
        match self {
            SpecialistEntry::Available { position, .. }
            | SpecialistEntry::Unavailable { position, .. } => *position,
        }
    }

    pub fn kind(&self) -> SpecialistKind {
        match self {
            SpecialistEntry::Available { kind, .. } | SpecialistEntry::Unavailable { kind, .. } => {
                *kind
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpecialistEntry::Available { .. })
    }
}

/// Everything the arbiter decides from: the shared draft and one entry per
/// roster slot, in roster order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterInput {
    pub draft: ProgramDraft,
    pub entries: Vec<SpecialistEntry>,
}

impl ArbiterInput {
    pub fn available(&self) -> usize {
        self.entries.iter().filter(|e| e.is_available()).count()
    }

    pub fn unavailable(&self) -> Vec<SpecialistKind> {
        self.entries
            .iter()
            .filter(|e| !e.is_available())
            .map(|e| e.kind())
            .collect()
    }
}

/// A disagreement and how it was settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub key: AdjustmentKey,
    pub candidates: Vec<Candidate>,
    pub chosen: usize,
    pub accepted: Vec<SpecialistKind>,
    pub overridden: Vec<SpecialistKind>,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arbitration {
    pub program: ProgramStructure,
    /// Winning change per adjustment point, in key order
    pub applied: Vec<Candidate>,
    pub resolutions: Vec<Resolution>,
    pub rationale: String,
    pub confidence: f64,
    pub unavailable: Vec<SpecialistKind>,
    pub policy: String,
}

pub struct Arbiter {
    policy: Arc<dyn ArbitrationPolicy>,
    min_quorum: usize,
}

impl Arbiter {
    pub fn new(policy: Arc<dyn ArbitrationPolicy>) -> Self {
        Self {
            policy,
            min_quorum: 1,
        }
    }

    pub fn with_min_quorum(mut self, min_quorum: usize) -> Self {
        self.min_quorum = min_quorum.max(1);
        self
    }

    pub fn min_quorum(&self) -> usize {
        self.min_quorum
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Merge the roster's opinions into one program
    ///
    /// Pure over `input`: entries are re-sorted by roster position, candidates
    /// are grouped in a `BTreeMap`, so completion order never matters.
    pub fn arbitrate(&self, arbiter_id: &str, input: &ArbiterInput) -> Result<Arbitration, Error> {
        let roster = input.entries.len();
        let available = input.available();
        if available < self.min_quorum {
            return Err(Error::InsufficientDeliberation {
                arbiter: arbiter_id.to_string(),
                roster,
                available,
                required: self.min_quorum,
            });
        }

        let mut entries: Vec<&SpecialistEntry> = input.entries.iter().collect();
        entries.sort_by_key(|e| e.position());

        let mut points: BTreeMap<AdjustmentKey, Vec<Candidate>> = BTreeMap::new();
        for entry in &entries {
            let SpecialistEntry::Available {
                position,
                kind,
                opinion,
            } = entry
            else {
                continue;
            };
            let supporter = Supporter {
                position: *position,
                kind: *kind,
            };
            for proposal in &opinion.proposals {
                let candidates = points.entry(proposal.adjustment.key()).or_default();
                match candidates
                    .iter_mut()
                    .find(|c| c.adjustment == proposal.adjustment)
                {
                    Some(existing) => {
                        if !existing.supporters.contains(&supporter) {
                            existing.supporters.push(supporter);
                        }
                    }
                    None => candidates.push(Candidate {
                        adjustment: proposal.adjustment.clone(),
                        supporters: vec![supporter],
                    }),
                }
            }
        }

        let mut program = input.draft.structure.clone();
        let mut applied = Vec::new();
        let mut resolutions = Vec::new();

        for (key, candidates) in points {
            let winner = if candidates.len() == 1 {
                0
            } else {
                let choice = self.policy.choose(&key, &candidates);
                let index = choice.index.min(candidates.len() - 1);
                let accepted: Vec<SpecialistKind> =
                    candidates[index].supporters.iter().map(|s| s.kind).collect();
                let mut overridden: Vec<SpecialistKind> = Vec::new();
                for (i, c) in candidates.iter().enumerate() {
                    if i == index {
                        continue;
                    }
                    for s in &c.supporters {
                        if !accepted.contains(&s.kind) && !overridden.contains(&s.kind) {
                            overridden.push(s.kind);
                        }
                    }
                }
                debug!(?key, rule = choice.rule, "resolved disagreement");
                resolutions.push(Resolution {
                    key: key.clone(),
                    candidates: candidates.clone(),
                    chosen: index,
                    accepted,
                    overridden,
                    rule: choice.rule.to_string(),
                });
                index
            };

            let chosen = &candidates[winner];
            apply(&mut program, &chosen.adjustment, input.draft.revision);
            applied.push(chosen.clone());
        }

        let unavailable = input.unavailable();
        let confidence = if roster == 0 {
            0.0
        } else {
            available as f64 / roster as f64
        };
        let mut rationale = rationale(input, &entries, &resolutions, applied.len());
        if let Some(point) = input.draft.revision {
            rationale.push_str(&format!(
                "\nRevised from {}; earlier sessions kept as trained.",
                point.describe()
            ));
        }

        Ok(Arbitration {
            program,
            applied,
            resolutions,
            rationale,
            confidence,
            unavailable,
            policy: self.policy.name().to_string(),
        })
    }
}

/// Apply one adjustment to every open week; out-of-range targets are a no-op.
/// With a revision point, trained days and weeks are left untouched.
fn apply(program: &mut ProgramStructure, adjustment: &Adjustment, revision: Option<RevisionPoint>) {
    let open = |week: u32, day: usize| revision.map_or(true, |r| !r.is_frozen(week, day));
    match adjustment {
        Adjustment::AddExercise { day, exercise } => {
            for week in &mut program.weeks {
                if !open(week.week_number, *day) {
                    continue;
                }
                let Some(d) = week.days.get_mut(*day) else {
                    continue;
                };
                match d.exercises.iter_mut().find(|e| e.key() == exercise.key()) {
                    Some(existing) => *existing = exercise.clone(),
                    None => d.exercises.push(exercise.clone()),
                }
            }
        }
        Adjustment::RemoveExercise { day, name } => {
            let key = exercise_key(name);
            for week in &mut program.weeks {
                if !open(week.week_number, *day) {
                    continue;
                }
                if let Some(d) = week.days.get_mut(*day) {
                    d.exercises.retain(|e| e.key() != key);
                }
            }
        }
        Adjustment::SetVolume {
            day,
            name,
            sets,
            reps_min,
            reps_max,
        } => {
            let key = exercise_key(name);
            for week in &mut program.weeks {
                if !open(week.week_number, *day) {
                    continue;
                }
                let Some(d) = week.days.get_mut(*day) else {
                    continue;
                };
                for e in d.exercises.iter_mut().filter(|e| e.key() == key) {
                    e.sets = *sets;
                    e.reps_min = *reps_min;
                    e.reps_max = *reps_max;
                }
            }
        }
        Adjustment::SetProgression {
            name,
            scheme,
            increment,
        } => {
            let key = exercise_key(name);
            for week in &mut program.weeks {
                let number = week.week_number;
                for (i, d) in week.days.iter_mut().enumerate() {
                    if !open(number, i) {
                        continue;
                    }
                    for e in d.exercises.iter_mut().filter(|e| e.key() == key) {
                        e.progression = *scheme;
                        e.increment = *increment;
                    }
                }
            }
        }
        Adjustment::SetDeloadWeeks { weeks } => {
            for week in &mut program.weeks {
                if revision.map_or(true, |r| r.opens_week(week.week_number)) {
                    week.deload = weeks.contains(&week.week_number);
                }
            }
        }
        Adjustment::SetPeriodization { periodization } => {
            program.periodization = *periodization;
        }
    }
}

fn rationale(
    input: &ArbiterInput,
    entries: &[&SpecialistEntry],
    resolutions: &[Resolution],
    applied: usize,
) -> String {
    let roster = entries.len();
    let available = input.available();
    let mut lines = vec![format!(
        "Synthesized from {} of {} specialist opinions; {} changes applied, {} disagreements resolved.",
        available,
        roster,
        applied,
        resolutions.len()
    )];

    if available < roster {
        lines.push("Reduced confidence: some specialists were unavailable.".to_string());
        for entry in entries {
            if let SpecialistEntry::Unavailable { kind, reason, .. } = entry {
                lines.push(format!("  - {} unavailable: {}", kind, reason));
            }
        }
    }

    for entry in entries {
        if let SpecialistEntry::Available { kind, opinion, .. } = entry {
            if !opinion.summary.is_empty() {
                lines.push(format!("{}: {}", kind, opinion.summary));
            }
        }
    }

    for r in resolutions {
        let chosen = &r.candidates[r.chosen];
        let names = |kinds: &[SpecialistKind]| {
            kinds
                .iter()
                .map(|k| k.display_name())
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!(
            "Resolved by {}: {} (accepted {}; overrode {})",
            r.rule,
            chosen.adjustment.describe(),
            names(&r.accepted),
            names(&r.overridden)
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deliberation::opinion::Proposal;
    use crate::deliberation::policy::{DomainPriority, MajorityVote};
    use crate::model::{
        ExerciseSpec, Periodization, ProgramFramework, ProgressionScheme, SplitType,
    };

    fn draft() -> ProgramDraft {
        let focuses = vec!["Full Body".to_string(), "Full Body".to_string()];
        let mut structure = ProgramStructure::skeleton("Test", 4, &focuses);
        for week in &mut structure.weeks {
            for day in &mut week.days {
                day.exercises.push(ExerciseSpec::new("Squat", 3, 6, 10));
            }
        }
        ProgramDraft {
            framework: ProgramFramework {
                split: SplitType::FullBody,
                days_per_week: 2,
                day_focuses: focuses,
                periodization: Periodization::Linear,
                progression_philosophy: "add load".into(),
                deload_strategy: "as needed".into(),
                weeks: 4,
            },
            structure,
            instruction: None,
            revision: None,
        }
    }

    fn opinion(kind: SpecialistKind, adjustments: Vec<Adjustment>) -> Opinion {
        Opinion {
            specialist: kind,
            summary: String::new(),
            proposals: adjustments
                .into_iter()
                .map(|a| Proposal::new(a, "because"))
                .collect(),
        }
    }

    fn volume(sets: u32, lo: u32, hi: u32) -> Adjustment {
        Adjustment::SetVolume {
            day: 0,
            name: "Squat".into(),
            sets,
            reps_min: lo,
            reps_max: hi,
        }
    }

    fn input() -> ArbiterInput {
        ArbiterInput {
            draft: draft(),
            entries: vec![
                SpecialistEntry::Available {
                    position: 0,
                    kind: SpecialistKind::StrengthCoach,
                    opinion: opinion(
                        SpecialistKind::StrengthCoach,
                        vec![
                            volume(5, 3, 5),
                            Adjustment::SetProgression {
                                name: "Squat".into(),
                                scheme: ProgressionScheme::Linear,
                                increment: 5.0,
                            },
                        ],
                    ),
                },
                SpecialistEntry::Available {
                    position: 1,
                    kind: SpecialistKind::HypertrophyExpert,
                    opinion: opinion(SpecialistKind::HypertrophyExpert, vec![volume(4, 8, 12)]),
                },
                SpecialistEntry::Available {
                    position: 2,
                    kind: SpecialistKind::PeriodizationSpecialist,
                    opinion: opinion(
                        SpecialistKind::PeriodizationSpecialist,
                        vec![Adjustment::SetDeloadWeeks { weeks: vec![4] }],
                    ),
                },
                SpecialistEntry::Unavailable {
                    position: 3,
                    kind: SpecialistKind::RecoveryAnalyst,
                    reason: "timed out".into(),
                },
            ],
        }
    }

    #[test]
    fn test_domain_priority_resolution() {
        let arbiter = Arbiter::new(Arc::new(DomainPriority));
        let result = arbiter.arbitrate("arb", &input()).unwrap();

        assert_eq!(result.resolutions.len(), 1);
        let r = &result.resolutions[0];
        assert_eq!(r.accepted, vec![SpecialistKind::HypertrophyExpert]);
        assert_eq!(r.overridden, vec![SpecialistKind::StrengthCoach]);

        let squat = &result.program.weeks[0].days[0].exercises[0];
        assert_eq!((squat.sets, squat.reps_min, squat.reps_max), (4, 8, 12));
        assert_eq!(squat.progression, ProgressionScheme::Linear);
        // Day 1 was not targeted by the volume change
        assert_eq!(result.program.weeks[0].days[1].exercises[0].sets, 3);
        assert!(result.program.weeks[3].deload);
        assert!(!result.program.weeks[0].deload);
    }

    #[test]
    fn test_majority_tie_favors_roster_order() {
        let arbiter = Arbiter::new(Arc::new(MajorityVote));
        let result = arbiter.arbitrate("arb", &input()).unwrap();
        let squat = &result.program.weeks[0].days[0].exercises[0];
        assert_eq!((squat.sets, squat.reps_min, squat.reps_max), (5, 3, 5));
    }

    #[test]
    fn test_unavailable_entries_lower_confidence() {
        let arbiter = Arbiter::new(Arc::new(DomainPriority));
        let result = arbiter.arbitrate("arb", &input()).unwrap();
        assert_eq!(result.unavailable, vec![SpecialistKind::RecoveryAnalyst]);
        assert!((result.confidence - 0.75).abs() < 1e-9);
        assert!(result.rationale.contains("Reduced confidence"));
        assert!(result.rationale.contains("Recovery Analyst unavailable: timed out"));
    }

    #[test]
    fn test_arbitration_ignores_entry_order() {
        let arbiter = Arbiter::new(Arc::new(DomainPriority));
        let forward = arbiter.arbitrate("arb", &input()).unwrap();

        let mut shuffled = input();
        shuffled.entries.reverse();
        let backward = arbiter.arbitrate("arb", &shuffled).unwrap();

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_revision_leaves_trained_sessions_alone() {
        let mut revising = input();
        revising.draft.revision = Some(RevisionPoint::new(3, 2));
        revising.entries[2] = SpecialistEntry::Available {
            position: 2,
            kind: SpecialistKind::PeriodizationSpecialist,
            opinion: opinion(
                SpecialistKind::PeriodizationSpecialist,
                vec![Adjustment::SetDeloadWeeks { weeks: vec![2, 4] }],
            ),
        };
        let arbiter = Arbiter::new(Arc::new(DomainPriority));
        let result = arbiter.arbitrate("arb", &revising).unwrap();

        let sets = |week: usize, day: usize| result.program.weeks[week].days[day].exercises[0].sets;
        // Volume targets day 1: frozen through week 3 day 1, open in week 4
        assert_eq!(sets(0, 0), 3);
        assert_eq!(sets(2, 0), 3);
        assert_eq!(sets(3, 0), 4);

        let progression =
            |week: usize, day: usize| result.program.weeks[week].days[day].exercises[0].progression;
        assert_eq!(progression(1, 1), ProgressionScheme::Double);
        assert_eq!(progression(2, 1), ProgressionScheme::Linear);

        // Week 2 was trained as a normal week and stays that way
        assert!(!result.program.weeks[1].deload);
        assert!(result.program.weeks[3].deload);
        assert!(result.rationale.contains("Revised from week 3, day 2"));

        let point = RevisionPoint::new(3, 2);
        assert!(point
            .frozen_changes(&revising.draft.structure, &result.program)
            .is_empty());
    }

    #[test]
    fn test_no_available_entries_is_insufficient() {
        let mut all_down = input();
        all_down.entries = all_down
            .entries
            .into_iter()
            .map(|e| SpecialistEntry::Unavailable {
                position: e.position(),
                kind: e.kind(),
                reason: "down".into(),
            })
            .collect();
        let err = Arbiter::new(Arc::new(MajorityVote))
            .arbitrate("arb", &all_down)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientDeliberation {
                available: 0,
                roster: 4,
                ..
            }
        ));
    }
}
