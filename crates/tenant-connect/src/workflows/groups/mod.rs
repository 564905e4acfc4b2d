//! Match groups: shared living arrangements and their membership consensus.

mod consensus;
pub mod domain;
mod registry;

pub use consensus::{ApprovalOutcome, ConsensusError, RemovalOutcome};
pub use domain::{GroupStatus, MatchGroup, MemberConfirmation};
pub use registry::{GroupRegistry, GroupUpdateError};
