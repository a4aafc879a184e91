//! Collaborator trait abstractions
//!
//! The engine never talks to a concrete membership system, voting power
//! computation, or execution backend. These traits are the seams: tests
//! inject the mocks from [`crate::governance::mock`], the CLI injects the
//! SQLite-backed space directory and a logging executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::GovernanceResult;
use super::proposal::Operation;
use super::threshold::Thresholds;

/// Identifier of a governance space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId(pub u64);

/// Identifier of a proposal (monotonically assigned by the store)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub u64);

/// Identity of a space member (opaque to the engine; caller authentication
/// is out of scope)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Supplies voting power figures for a space.
///
/// Contract: for a fixed `at`, the sum of `voting_power_of` over all members
/// never exceeds `total_voting_power`. The engine snapshots the total at
/// proposal creation and looks up per-voter power at that same snapshot
/// time, so tallies can never exceed the snapshot.
#[async_trait]
pub trait VotingPowerSource: Send + Sync {
    /// Total eligible voting power in a space at the given time.
    async fn total_voting_power(&self, space: SpaceId, at: Timestamp) -> GovernanceResult<u64>;

    /// Voting power of a single member at the given time (0 if not a member).
    async fn voting_power_of(
        &self,
        space: SpaceId,
        member: &MemberId,
        at: Timestamp,
    ) -> GovernanceResult<u64>;
}

/// Per-space configuration read live at evaluation time.
///
/// Thresholds are deliberately NOT snapshotted at proposal creation:
/// administrators can change them mid-vote and the next evaluation uses the
/// current values.
#[async_trait]
pub trait SpaceConfigSource: Send + Sync {
    /// Current quorum/unity thresholds for a space.
    async fn thresholds(&self, space: SpaceId) -> GovernanceResult<Thresholds>;

    /// Whether the identity is a space administrator (owner included).
    async fn is_administrator(&self, space: SpaceId, member: &MemberId) -> GovernanceResult<bool>;

    /// Minimum allowed proposal duration in seconds (0 = no floor).
    async fn minimum_duration(&self, space: SpaceId) -> GovernanceResult<u64>;
}

/// Failure reported by the batch executor.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ExecutionError(pub String);

/// Executes a proposal's operation batch, all-or-nothing.
///
/// The engine only decides *whether* and *once* to invoke this; atomicity of
/// the batch itself is the implementor's contract. On `Err` the engine keeps
/// the proposal non-terminal so a later `evaluate` can retry.
#[async_trait]
pub trait OperationBatchExecutor: Send + Sync {
    async fn execute_all(&self, operations: &[Operation]) -> Result<(), ExecutionError>;
}

/// Time source. Nothing in the engine fires at `end_time`; the window
/// boundary is a data comparison against this clock at evaluation time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
