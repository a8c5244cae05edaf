use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::opinion::{Adjustment, AdjustmentKey, SpecialistKind};

/// A specialist backing a candidate, identified by roster position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supporter {
    pub position: usize,
    pub kind: SpecialistKind,
}

/// One distinct proposal for a disputed point, with everyone who made it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub adjustment: Adjustment,
    /// Sorted by roster position
    pub supporters: Vec<Supporter>,
}

impl Candidate {
    pub fn first_position(&self) -> usize {
        self.supporters
            .first()
            .map(|s| s.position)
            .unwrap_or(usize::MAX)
    }

    pub fn supported_by(&self, kind: SpecialistKind) -> bool {
        self.supporters.iter().any(|s| s.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub index: usize,
    pub rule: &'static str,
}

/// Conflict-resolution rule behind the arbiter
///
/// Implementations must be pure: the same key and candidates in the same order
/// always yield the same choice.
pub trait ArbitrationPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pick a winner among two or more candidates, ordered by first supporter
    fn choose(&self, key: &AdjustmentKey, candidates: &[Candidate]) -> Choice;
}

/// Most supporters wins; ties go to the earliest roster position
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityVote;

impl MajorityVote {
    fn pick(candidates: &[Candidate]) -> usize {
        let mut best = 0;
        for (i, c) in candidates.iter().enumerate().skip(1) {
            let current = &candidates[best];
            let more = c.supporters.len() > current.supporters.len();
            let tie_earlier = c.supporters.len() == current.supporters.len()
                && c.first_position() < current.first_position();
            if more || tie_earlier {
                best = i;
            }
        }
        best
    }
}

impl ArbitrationPolicy for MajorityVote {
    fn name(&self) -> &'static str {
        "majority"
    }

    fn choose(&self, _key: &AdjustmentKey, candidates: &[Candidate]) -> Choice {
        Choice {
            index: Self::pick(candidates),
            rule: "majority vote",
        }
    }
}

/// The specialist owning the disputed domain decides; majority otherwise
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainPriority;

impl DomainPriority {
    pub fn owner(key: &AdjustmentKey) -> SpecialistKind {
        match key {
            AdjustmentKey::Exercise { .. } => SpecialistKind::RecoveryAnalyst,
            AdjustmentKey::Volume { .. } => SpecialistKind::HypertrophyExpert,
            AdjustmentKey::Progression { .. } => SpecialistKind::StrengthCoach,
            AdjustmentKey::Deload | AdjustmentKey::Periodization => {
                SpecialistKind::PeriodizationSpecialist
            }
        }
    }
}

impl ArbitrationPolicy for DomainPriority {
    fn name(&self) -> &'static str {
        "domain_priority"
    }

    fn choose(&self, key: &AdjustmentKey, candidates: &[Candidate]) -> Choice {
        let owner = Self::owner(key);
        match candidates.iter().position(|c| c.supported_by(owner)) {
            Some(index) => Choice {
                index,
                rule: "domain owner",
            },
            None => Choice {
                index: MajorityVote::pick(candidates),
                rule: "majority vote (owner silent)",
            },
        }
    }
}

/// Policy selector for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Majority,
    #[default]
    DomainPriority,
}

impl PolicyKind {
    pub fn build(&self) -> Arc<dyn ArbitrationPolicy> {
        match self {
            PolicyKind::Majority => Arc::new(MajorityVote),
            PolicyKind::DomainPriority => Arc::new(DomainPriority),
        }
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "majority" | "majority_vote" => Ok(PolicyKind::Majority),
            "domain_priority" | "domain" => Ok(PolicyKind::DomainPriority),
            other => Err(format!("unknown arbitration policy: {}", other)),
        }
    }
}
