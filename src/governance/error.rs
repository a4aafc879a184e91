//! Governance error taxonomy
//!
//! Every variant is a recoverable, caller-facing result; none is fatal to
//! the process. `ExecutionFailed` is the only error that can occur after a
//! pass decision has been made internally — the proposal stays non-terminal
//! and a retried `evaluate` may attempt execution again. All other errors
//! are returned before any state mutation.

use thiserror::Error;

use super::traits::{MemberId, ProposalId, SpaceId};
use crate::store::StoreError;

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("proposal {0} not found")]
    NotFound(ProposalId),

    #[error("space {0} not found")]
    UnknownSpace(SpaceId),

    #[error("{member} has no voting power in space {space}")]
    NotMember { space: SpaceId, member: MemberId },

    #[error("{0} has already voted on this proposal")]
    AlreadyVoted(MemberId),

    #[error("voting window has closed")]
    VotingClosed,

    #[error("proposal is already resolved")]
    AlreadyResolved,

    #[error("caller is neither the proposal creator nor a space administrator")]
    Unauthorized,

    #[error("invalid duration: {requested}s (minimum {minimum}s)")]
    InvalidDuration { requested: u64, minimum: u64 },

    #[error("proposal has no operations")]
    EmptyOperationSet,

    #[error("batch execution failed: {0}")]
    ExecutionFailed(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
