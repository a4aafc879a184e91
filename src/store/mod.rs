//! Proposal persistence
//!
//! The engine owns proposal state through the [`ProposalStore`] trait so the
//! backing medium stays swappable: the in-memory store backs unit tests and
//! ephemeral runs, the SQLite store gives the durability the engine needs
//! (a resolved proposal's terminal state must survive restarts).
//!
//! Terminal transitions (`mark_executed` / `mark_expired` /
//! `mark_withdrawn`) are compare-and-set against "still non-terminal" and
//! report whether they won the transition. That guard, not the caller, is
//! what makes redundant or concurrent resolution attempts safe.

pub mod memory;
pub mod spaces;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::governance::proposal::{NewProposal, Proposal};
use crate::governance::traits::{MemberId, ProposalId, SpaceId};

pub use memory::MemoryProposalStore;
pub use spaces::SpaceDirectory;
pub use sqlite::{open_database, SqliteProposalStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Persist a new proposal and assign the next monotonic id.
    async fn allocate(&self, new: NewProposal) -> StoreResult<ProposalId>;

    /// Load a full proposal record, ballots included.
    async fn load(&self, id: ProposalId) -> StoreResult<Option<Proposal>>;

    /// Append a ballot and bump the matching tally. The caller has already
    /// verified the voter has not voted; the store's uniqueness guarantee is
    /// the backstop.
    async fn record_vote(
        &self,
        id: ProposalId,
        voter: &MemberId,
        support: bool,
        power: u64,
    ) -> StoreResult<()>;

    /// Set `executed`, only if the proposal is still non-terminal.
    /// Returns whether this call performed the transition.
    async fn mark_executed(&self, id: ProposalId) -> StoreResult<bool>;

    /// Set `expired`, only if the proposal is still non-terminal.
    async fn mark_expired(&self, id: ProposalId) -> StoreResult<bool>;

    /// Set `withdrawn` (and for an administrator veto also `expired` and
    /// `withdrawn_by_admin`), only if the proposal is still non-terminal.
    async fn mark_withdrawn(&self, id: ProposalId, by_admin: bool) -> StoreResult<bool>;

    /// All proposals of a space, newest first.
    async fn list_by_space(&self, space: SpaceId) -> StoreResult<Vec<Proposal>>;

    /// Highest assigned proposal id, if any proposal exists.
    async fn latest_id(&self) -> StoreResult<Option<ProposalId>>;
}
