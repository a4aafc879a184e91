//! Governance engine
//!
//! Single inbound surface for the proposal lifecycle: create, vote,
//! evaluate, withdraw, plus the read projections. Resolution is lazy —
//! nothing fires at `end_time`; a proposal's fate is settled whenever
//! `evaluate` is next invoked, whether as a side effect of a vote, by an
//! external sweep, or by any caller at all.
//!
//! Concurrency model: operations on the same proposal are serialized
//! through a per-proposal async lock, and the store's compare-and-set
//! terminal transitions are the backstop, so redundant or concurrent
//! `evaluate` calls can neither double-execute nor double-expire.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::error::{GovernanceError, GovernanceResult};
use super::proposal::{NewProposal, Operation, Proposal, ProposalState, ProposalView};
use super::threshold::{self, Decision, Tally};
use super::traits::{
    Clock, MemberId, OperationBatchExecutor, ProposalId, SpaceConfigSource, SpaceId,
    VotingPowerSource,
};
use crate::store::ProposalStore;

/// Hands out one lock per proposal id. Entries are never removed; a
/// resolved proposal's lock is cheap and keeps late callers serialized too.
#[derive(Default)]
struct LockMap {
    inner: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl LockMap {
    async fn acquire(&self, id: ProposalId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(id.0).or_default().clone()
        };
        slot.lock_owned().await
    }
}

pub struct GovernanceEngine<S> {
    store: Arc<S>,
    power: Arc<dyn VotingPowerSource>,
    config: Arc<dyn SpaceConfigSource>,
    executor: Arc<dyn OperationBatchExecutor>,
    clock: Arc<dyn Clock>,
    locks: LockMap,
}

impl<S: ProposalStore> GovernanceEngine<S> {
    pub fn new(
        store: Arc<S>,
        power: Arc<dyn VotingPowerSource>,
        config: Arc<dyn SpaceConfigSource>,
        executor: Arc<dyn OperationBatchExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            power,
            config,
            executor,
            clock,
            locks: LockMap::default(),
        }
    }

    /// Create a proposal, snapshotting the space's total voting power at
    /// call time. The operation list is frozen from here on; there is no
    /// amend operation.
    pub async fn create_proposal(
        &self,
        space: SpaceId,
        creator: MemberId,
        duration_secs: u64,
        operations: Vec<Operation>,
    ) -> GovernanceResult<ProposalId> {
        let minimum = self.config.minimum_duration(space).await?;
        if duration_secs == 0 || duration_secs < minimum {
            return Err(GovernanceError::InvalidDuration {
                requested: duration_secs,
                minimum: minimum.max(1),
            });
        }
        if operations.is_empty() {
            return Err(GovernanceError::EmptyOperationSet);
        }

        let now = self.clock.now();
        // A window end past the representable range is as invalid as a
        // zero-length one.
        let end_time =
            now.checked_add(duration_secs)
                .ok_or(GovernanceError::InvalidDuration {
                    requested: duration_secs,
                    minimum: minimum.max(1),
                })?;

        let creator_power = self.power.voting_power_of(space, &creator, now).await?;
        if creator_power == 0 {
            return Err(GovernanceError::NotMember {
                space,
                member: creator,
            });
        }

        let total = self.power.total_voting_power(space, now).await?;

        let id = self
            .store
            .allocate(NewProposal {
                space_id: space,
                creator: creator.clone(),
                start_time: now,
                end_time,
                total_voting_power_at_snapshot: total,
                operations,
            })
            .await?;

        info!(
            proposal = id.0,
            space = space.0,
            creator = %creator,
            total_power = total,
            duration_secs,
            "proposal created"
        );
        Ok(id)
    }

    /// Cast a vote and immediately attempt resolution, so a proposal that
    /// has already met its thresholds passes without waiting for
    /// `end_time`.
    ///
    /// The voter's power is looked up at the proposal's snapshot time, so
    /// tallies can never exceed the snapshot total. If the triggered
    /// resolution passes but the batch executor fails, the ballot stays
    /// recorded and the failure is surfaced; a later `evaluate` retries.
    pub async fn vote(
        &self,
        id: ProposalId,
        voter: MemberId,
        support: bool,
    ) -> GovernanceResult<ProposalState> {
        let _guard = self.locks.acquire(id).await;

        let proposal = self.load(id).await?;
        if proposal.is_terminal() {
            return Err(GovernanceError::AlreadyResolved);
        }
        if self.clock.now() >= proposal.end_time {
            return Err(GovernanceError::VotingClosed);
        }
        if proposal.has_voted(&voter) {
            return Err(GovernanceError::AlreadyVoted(voter));
        }

        let power = self
            .power
            .voting_power_of(proposal.space_id, &voter, proposal.start_time)
            .await?;
        if power == 0 {
            return Err(GovernanceError::NotMember {
                space: proposal.space_id,
                member: voter,
            });
        }

        self.store.record_vote(id, &voter, support, power).await?;
        debug!(proposal = id.0, voter = %voter, support, power, "vote recorded");

        self.resolve_locked(id).await
    }

    /// Evaluate a proposal: execute it, mark it expired, or leave it
    /// pending. Callable by anyone, any number of times; a no-op returning
    /// the current state once the proposal is terminal.
    ///
    /// Thresholds are read live from the space configuration on every call,
    /// while the voting power total stays snapshotted — administrators can
    /// change thresholds mid-vote and the next evaluation uses the current
    /// values.
    pub async fn evaluate(&self, id: ProposalId) -> GovernanceResult<ProposalState> {
        let _guard = self.locks.acquire(id).await;
        self.resolve_locked(id).await
    }

    /// Retract a not-yet-resolved proposal. The creator withdraws their own
    /// proposal; an administrator's withdrawal is a veto and additionally
    /// marks the proposal expired.
    pub async fn withdraw(&self, id: ProposalId, caller: MemberId) -> GovernanceResult<()> {
        let _guard = self.locks.acquire(id).await;

        let proposal = self.load(id).await?;
        if proposal.is_terminal() {
            return Err(GovernanceError::AlreadyResolved);
        }

        let by_admin = if caller == proposal.creator {
            false
        } else if self
            .config
            .is_administrator(proposal.space_id, &caller)
            .await?
        {
            true
        } else {
            return Err(GovernanceError::Unauthorized);
        };

        self.store.mark_withdrawn(id, by_admin).await?;
        info!(proposal = id.0, caller = %caller, by_admin, "proposal withdrawn");
        Ok(())
    }

    /// Read-only projection of a proposal.
    pub async fn get_proposal(&self, id: ProposalId) -> GovernanceResult<ProposalView> {
        Ok(self.load(id).await?.view())
    }

    /// Whether the member has already cast a ballot on the proposal.
    pub async fn has_voted(&self, id: ProposalId, voter: &MemberId) -> GovernanceResult<bool> {
        Ok(self.load(id).await?.has_voted(voter))
    }

    /// Yes-voter and no-voter lists.
    pub async fn proposal_voters(
        &self,
        id: ProposalId,
    ) -> GovernanceResult<(Vec<MemberId>, Vec<MemberId>)> {
        Ok(self.load(id).await?.voters())
    }

    /// Highest assigned proposal id, if any.
    pub async fn latest_proposal_id(&self) -> GovernanceResult<Option<ProposalId>> {
        Ok(self.store.latest_id().await?)
    }

    /// All proposals of a space, newest first.
    pub async fn list_space_proposals(&self, space: SpaceId) -> GovernanceResult<Vec<ProposalView>> {
        let proposals = self.store.list_by_space(space).await?;
        Ok(proposals.iter().map(Proposal::view).collect())
    }

    /// Evaluate every non-terminal proposal of a space whose window has
    /// closed. Returns the number of proposals that reached a terminal
    /// state. Execution failures are logged and skipped so one broken
    /// batch cannot stall the rest of the sweep.
    pub async fn sweep_space(&self, space: SpaceId) -> GovernanceResult<usize> {
        let now = self.clock.now();
        let proposals = self.store.list_by_space(space).await?;

        let mut resolved = 0;
        for proposal in proposals {
            if proposal.is_terminal() || now < proposal.end_time {
                continue;
            }
            match self.evaluate(proposal.id).await {
                Ok(ProposalState::Pending) => {}
                Ok(_) => resolved += 1,
                Err(GovernanceError::ExecutionFailed(reason)) => {
                    warn!(proposal = proposal.id.0, %reason, "sweep: execution failed, will retry on next pass");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }

    async fn load(&self, id: ProposalId) -> GovernanceResult<Proposal> {
        self.store
            .load(id)
            .await?
            .ok_or(GovernanceError::NotFound(id))
    }

    /// Resolution body; the caller holds the proposal's lock.
    async fn resolve_locked(&self, id: ProposalId) -> GovernanceResult<ProposalState> {
        let proposal = self.load(id).await?;
        if proposal.is_terminal() {
            return Ok(proposal.state());
        }

        let thresholds = self.config.thresholds(proposal.space_id).await?;
        let tally = Tally {
            yes: proposal.yes_votes,
            no: proposal.no_votes,
            total_power: proposal.total_voting_power_at_snapshot,
        };
        let window_closed = self.clock.now() >= proposal.end_time;

        match threshold::decide(&tally, &thresholds, window_closed) {
            Decision::Passed => {
                // Execution is confirmed before any state is written; on
                // failure the proposal stays non-terminal and retriable.
                self.executor
                    .execute_all(&proposal.operations)
                    .await
                    .map_err(|e| {
                        warn!(proposal = id.0, error = %e, "batch execution failed");
                        GovernanceError::ExecutionFailed(e.to_string())
                    })?;

                self.store.mark_executed(id).await?;
                info!(
                    proposal = id.0,
                    yes = tally.yes,
                    no = tally.no,
                    "proposal passed and executed"
                );
                Ok(ProposalState::Executed)
            }
            Decision::Rejected => {
                self.store.mark_expired(id).await?;
                info!(
                    proposal = id.0,
                    yes = tally.yes,
                    no = tally.no,
                    window_closed,
                    "proposal rejected"
                );
                Ok(ProposalState::Expired)
            }
            Decision::Undecided => Ok(ProposalState::Pending),
        }
    }
}
