//! Proposal governance core
//!
//! Weighted-voting proposal lifecycle for membership spaces: members submit
//! proposals carrying a frozen batch of operations, the space votes with
//! per-member voting power against a creation-time power snapshot, and a
//! proposal that clears its space's quorum and unity thresholds has its
//! batch executed atomically. Everything downstream of the engine (who has
//! power, what thresholds apply, how operations are applied) comes in
//! through the traits in [`traits`].
//!
//! Lifecycle in one line: Pending -> Executed | Expired | Withdrawn, the
//! three terminal states mutually exclusive and each set at most once.

pub mod engine;
pub mod error;
pub mod mock;
pub mod proposal;
pub mod threshold;
pub mod traits;

#[cfg(test)]
mod proptests;

pub use engine::GovernanceEngine;
pub use error::{GovernanceError, GovernanceResult};
pub use proposal::{Ballot, NewProposal, Operation, Proposal, ProposalState, ProposalView};
pub use threshold::{decide, required_quorum, Decision, Tally, Thresholds};
pub use traits::{
    Clock, ExecutionError, MemberId, OperationBatchExecutor, ProposalId, SpaceConfigSource,
    SpaceId, SystemClock, Timestamp, VotingPowerSource,
};
