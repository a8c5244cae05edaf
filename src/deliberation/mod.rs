//! Specialist opinions and their arbitration into one program.

mod arbiter;
mod opinion;
mod policy;

pub use arbiter::{Arbiter, ArbiterInput, Arbitration, Resolution, SpecialistEntry};
pub use opinion::{Adjustment, AdjustmentKey, Opinion, Proposal, SpecialistKind};
pub use policy::{
    ArbitrationPolicy, Candidate, Choice, DomainPriority, MajorityVote, PolicyKind, Supporter,
};
