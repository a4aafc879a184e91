//! In-memory proposal store for tests and ephemeral runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{ProposalStore, StoreResult};
use crate::governance::proposal::{Ballot, NewProposal, Proposal};
use crate::governance::traits::{MemberId, ProposalId, SpaceId};

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    proposals: BTreeMap<u64, Proposal>,
}

#[derive(Default)]
pub struct MemoryProposalStore {
    state: Mutex<MemoryState>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProposalStore for MemoryProposalStore {
    async fn allocate(&self, new: NewProposal) -> StoreResult<ProposalId> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = ProposalId(state.next_id);

        state.proposals.insert(
            id.0,
            Proposal {
                id,
                space_id: new.space_id,
                creator: new.creator,
                start_time: new.start_time,
                end_time: new.end_time,
                total_voting_power_at_snapshot: new.total_voting_power_at_snapshot,
                yes_votes: 0,
                no_votes: 0,
                operations: new.operations,
                executed: false,
                expired: false,
                withdrawn: false,
                withdrawn_by_admin: false,
                ballots: BTreeMap::new(),
            },
        );

        Ok(id)
    }

    async fn load(&self, id: ProposalId) -> StoreResult<Option<Proposal>> {
        let state = self.state.lock().await;
        Ok(state.proposals.get(&id.0).cloned())
    }

    async fn record_vote(
        &self,
        id: ProposalId,
        voter: &MemberId,
        support: bool,
        power: u64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(proposal) = state.proposals.get_mut(&id.0) {
            if proposal.ballots.contains_key(voter) {
                return Ok(()); // backstop; the engine rejects re-votes first
            }
            proposal.ballots.insert(voter.clone(), Ballot { support, power });
            if support {
                proposal.yes_votes += power;
            } else {
                proposal.no_votes += power;
            }
        }
        Ok(())
    }

    async fn mark_executed(&self, id: ProposalId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(match state.proposals.get_mut(&id.0) {
            Some(p) if !p.is_terminal() => {
                p.executed = true;
                true
            }
            _ => false,
        })
    }

    async fn mark_expired(&self, id: ProposalId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(match state.proposals.get_mut(&id.0) {
            Some(p) if !p.is_terminal() => {
                p.expired = true;
                true
            }
            _ => false,
        })
    }

    async fn mark_withdrawn(&self, id: ProposalId, by_admin: bool) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(match state.proposals.get_mut(&id.0) {
            Some(p) if !p.is_terminal() => {
                p.withdrawn = true;
                if by_admin {
                    p.withdrawn_by_admin = true;
                    p.expired = true;
                }
                true
            }
            _ => false,
        })
    }

    async fn list_by_space(&self, space: SpaceId) -> StoreResult<Vec<Proposal>> {
        let state = self.state.lock().await;
        let mut result: Vec<Proposal> = state
            .proposals
            .values()
            .filter(|p| p.space_id == space)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(result)
    }

    async fn latest_id(&self) -> StoreResult<Option<ProposalId>> {
        let state = self.state.lock().await;
        Ok(state.proposals.keys().next_back().map(|&id| ProposalId(id)))
    }
}
